//! Fixed defaults shared across the calmir ecosystem.

/// Default lookback for full sync windows, in days.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Default lookahead for full sync windows, in days.
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 365;

/// Hard cap on event pages fetched per calendar in one full sync run.
pub const MAX_EVENT_PAGES: u32 = 50;

/// Events requested per page.
pub const EVENTS_PAGE_SIZE: u32 = 250;

/// Touched event ids are queued for downstream indexing in batches of
/// this size.
pub const INDEX_BATCH_SIZE: usize = 100;

/// Two events "start at the same time" when their starts are within
/// this many minutes of each other.
pub const SAME_TIME_THRESHOLD_MINUTES: i64 = 1;

/// Conflict results are capped at this count.
pub const MAX_CONFLICTS: usize = 10;

/// Quota units allowed per rolling second, per user.
pub const QUOTA_UNITS_PER_SECOND: u32 = 10;

/// Quota units allowed per rolling minute, per user.
pub const QUOTA_UNITS_PER_MINUTE: u32 = 400;

/// How long a caller waits for quota before giving up.
pub const QUOTA_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Poll interval while waiting for quota.
pub const QUOTA_POLL_INTERVAL_MS: u64 = 100;

/// Remote call retry attempts (first try included).
pub const RETRY_MAX_ATTEMPTS: u32 = 4;

/// Base delay for exponential backoff between retries.
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Backoff delays are capped here.
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Maximum webhook channel lifetime granted by the remote system.
pub const WEBHOOK_CHANNEL_TTL_HOURS: i64 = 168;

/// Channels expiring within this buffer are renewed by the sweep.
pub const WEBHOOK_RENEWAL_BUFFER_HOURS: i64 = 24;

/// Repeated notifications for a channel within this window coalesce.
pub const WEBHOOK_DEBOUNCE_MS: u64 = 5_000;

/// Pending approvals expire this long after creation by default.
pub const APPROVAL_EXPIRY_HOURS: i64 = 24;

/// Default cadence for per-user recurring incremental sync.
pub const INCREMENTAL_SYNC_INTERVAL_MINUTES: u64 = 15;
