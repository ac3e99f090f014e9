//! Quota-aware rate limiting.
//!
//! The remote system meters API usage in abstract quota units, not
//! call counts. The limiter tracks units per user over two independent
//! rolling windows (per-second and per-minute) and offers a
//! non-consuming `peek`, a consuming `check`, an unconditional
//! `consume` for usage that already happened, and a polling
//! `wait_for_quota`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use calmir_core::config::QuotaConfig;
use calmir_core::error::{CalmirError, CalmirResult};
use tokio::time::Instant;

const SECOND_WINDOW: Duration = Duration::from_secs(1);
const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Unit budgets per rolling window.
#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    pub units_per_second: u32,
    pub units_per_minute: u32,
}

impl From<&QuotaConfig> for QuotaLimits {
    fn from(config: &QuotaConfig) -> Self {
        QuotaLimits {
            units_per_second: config.units_per_second,
            units_per_minute: config.units_per_minute,
        }
    }
}

/// Outcome of a quota computation.
#[derive(Debug, Clone, Copy)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Suggested wait before the units would fit, when not allowed.
    pub wait: Option<Duration>,
    pub second_remaining: u32,
    pub minute_remaining: u32,
}

/// Per-user quota tracking over both rolling windows.
///
/// Usage records live in one deque per user; both windows read the
/// same records with different horizons. The mutex guards only the
/// counter arithmetic and is never held across an await.
pub struct RateLimiter {
    limits: QuotaLimits,
    poll_interval: Duration,
    users: Mutex<HashMap<String, VecDeque<(Instant, u32)>>>,
}

impl RateLimiter {
    pub fn new(limits: QuotaLimits, poll_interval: Duration) -> RateLimiter {
        RateLimiter {
            limits,
            poll_interval,
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &QuotaConfig) -> RateLimiter {
        RateLimiter::new(
            QuotaLimits::from(config),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    /// Read-only decision: would `units` fit right now? Never mutates
    /// the counters.
    pub fn peek(&self, user_id: &str, units: u32) -> QuotaDecision {
        let units = units.max(1);
        let now = Instant::now();
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let entries = users.entry(user_id.to_string()).or_default();
        prune(entries, now);
        decide(entries, now, units, &self.limits)
    }

    /// Same computation as `peek`, but records the units atomically
    /// when (and only when) they fit.
    pub fn check(&self, user_id: &str, units: u32) -> QuotaDecision {
        let units = units.max(1);
        let now = Instant::now();
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let entries = users.entry(user_id.to_string()).or_default();
        prune(entries, now);
        let decision = decide(entries, now, units, &self.limits);
        if decision.allowed {
            entries.push_back((now, units));
        }
        decision
    }

    /// Record units unconditionally, even past the limit. Used for
    /// usage that already happened outside the normal gate.
    pub fn consume(&self, user_id: &str, units: u32) {
        let units = units.max(1);
        let now = Instant::now();
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let entries = users.entry(user_id.to_string()).or_default();
        prune(entries, now);
        entries.push_back((now, units));
    }

    /// Poll `peek` until the units fit or the timeout elapses.
    ///
    /// Waiting never consumes quota — a caller that times out has
    /// wasted nothing. The caller still has to `check` afterwards, and
    /// two callers can both see a passing peek with only one check
    /// succeeding; that race is accepted.
    pub async fn wait_for_quota(
        &self,
        user_id: &str,
        units: u32,
        timeout: Duration,
    ) -> CalmirResult<()> {
        let deadline = Instant::now() + timeout;

        loop {
            let decision = self.peek(user_id, units);
            if decision.allowed {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CalmirError::RateLimited {
                    message: format!(
                        "timed out after {}ms waiting for {} quota units",
                        timeout.as_millis(),
                        units.max(1)
                    ),
                    retry_after: decision.wait,
                });
            }

            let sleep = self.poll_interval.min(deadline - now);
            tokio::time::sleep(sleep).await;
        }
    }
}

fn prune(entries: &mut VecDeque<(Instant, u32)>, now: Instant) {
    while let Some(&(at, _)) = entries.front() {
        if now.duration_since(at) >= MINUTE_WINDOW {
            entries.pop_front();
        } else {
            break;
        }
    }
}

fn decide(
    entries: &VecDeque<(Instant, u32)>,
    now: Instant,
    units: u32,
    limits: &QuotaLimits,
) -> QuotaDecision {
    let second_used = used_in(entries, now, SECOND_WINDOW);
    let minute_used = used_in(entries, now, MINUTE_WINDOW);

    let second_ok = second_used + units <= limits.units_per_second;
    let minute_ok = minute_used + units <= limits.units_per_minute;
    let allowed = second_ok && minute_ok;

    let wait = if allowed {
        None
    } else {
        let mut wait = Duration::ZERO;
        if !second_ok {
            wait = wait.max(wait_for_window(
                entries,
                now,
                SECOND_WINDOW,
                units,
                limits.units_per_second,
            ));
        }
        if !minute_ok {
            wait = wait.max(wait_for_window(
                entries,
                now,
                MINUTE_WINDOW,
                units,
                limits.units_per_minute,
            ));
        }
        Some(wait)
    };

    QuotaDecision {
        allowed,
        wait,
        second_remaining: limits.units_per_second.saturating_sub(second_used),
        minute_remaining: limits.units_per_minute.saturating_sub(minute_used),
    }
}

fn used_in(entries: &VecDeque<(Instant, u32)>, now: Instant, window: Duration) -> u32 {
    entries
        .iter()
        .filter(|(at, _)| now.duration_since(*at) < window)
        .map(|(_, units)| units)
        .sum()
}

/// Time until enough of the oldest in-window usage ages out for
/// `units` to fit under `limit`. A request larger than the whole
/// budget can never fit; suggest the full window.
fn wait_for_window(
    entries: &VecDeque<(Instant, u32)>,
    now: Instant,
    window: Duration,
    units: u32,
    limit: u32,
) -> Duration {
    if units > limit {
        return window;
    }

    let mut used = used_in(entries, now, window);
    for (at, entry_units) in entries {
        if used + units <= limit {
            break;
        }
        if now.duration_since(*at) < window {
            used = used.saturating_sub(*entry_units);
            if used + units <= limit {
                return window.saturating_sub(now.duration_since(*at));
            }
        }
    }

    window
}
