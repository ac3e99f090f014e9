//! Webhook channel management and notification handling.
//!
//! Registration opens a push-notification channel with the remote
//! system; inbound notifications are authenticated (channel, resource
//! and verification token must all match the stored registration),
//! debounced, and turned into incremental sync jobs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use calmir_core::config::WebhookConfig;
use calmir_core::error::{CalmirError, CalmirResult};
use calmir_core::remote::protocol::{CalendarApi, RemoteOp, WatchChannel, WatchRequest};
use calmir_core::sync_state::WebhookChannel;
use calmir_core::webhook::{RawNotification, ResourceState};
use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::credentials::CredentialProvider;
use crate::executor::RemoteExecutor;
use crate::scheduler::Scheduler;
use crate::store::{MirrorStore, SyncStateStore};

/// The watched collection. One channel per user covers the primary
/// calendar; per-calendar fan-out arrives through the same channel.
const WATCHED_CALENDAR: &str = "primary";

/// Process-local, best-effort coalescing of repeated notifications.
///
/// Owned component with no ambient timer: stale entries are pruned
/// lazily on each acquire. Multi-instance deployments under-debounce,
/// which is acceptable — this is not a distributed lock.
pub struct Debouncer {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Debouncer {
        Debouncer {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// True when the caller should act on this key; false while inside
    /// the debounce window of a previous acquire.
    pub fn acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.retain(|_, at| now.duration_since(*at) < self.window);

        if seen.contains_key(key) {
            false
        } else {
            seen.insert(key.to_string(), now);
            true
        }
    }
}

/// What handling a notification resulted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Channel handshake; nothing to do.
    Acknowledged,
    /// Coalesced into an earlier notification's sync.
    Debounced,
    /// An incremental sync job was scheduled.
    SyncScheduled,
    /// Valid but actionless (resource gone).
    Ignored,
}

#[derive(Debug, Default)]
pub struct RenewalReport {
    pub renewed: u32,
    pub failures: Vec<(String, String)>,
}

pub struct WebhookManager {
    store: Arc<dyn MirrorStore>,
    api: Arc<dyn CalendarApi>,
    credentials: Arc<dyn CredentialProvider>,
    executor: Arc<RemoteExecutor>,
    scheduler: Arc<Scheduler>,
    debouncer: Debouncer,
    config: WebhookConfig,
}

impl WebhookManager {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        api: Arc<dyn CalendarApi>,
        credentials: Arc<dyn CredentialProvider>,
        executor: Arc<RemoteExecutor>,
        scheduler: Arc<Scheduler>,
        config: WebhookConfig,
    ) -> WebhookManager {
        let debouncer = Debouncer::new(Duration::from_millis(config.debounce_ms));
        WebhookManager {
            store,
            api,
            credentials,
            executor,
            scheduler,
            debouncer,
            config,
        }
    }

    /// Open a fresh channel for the user, replacing any existing one.
    ///
    /// The verification token on the watch is the owning user id;
    /// notifications echo it back and are authenticated against it.
    pub async fn register_channel(&self, user_id: &str) -> CalmirResult<WatchChannel> {
        let mut state = self.store.get_or_create_sync_state(user_id).await?;
        let token = self.credentials.access_token(user_id).await?;

        // Best-effort stop of the old channel; it may already have
        // lapsed on the remote side.
        if let Some(existing) = state.webhook.take() {
            let stop = self
                .executor
                .run(user_id, RemoteOp::StopChannel, 0, || async {
                    self.api
                        .stop_channel(&token, &existing.channel_id, &existing.resource_id)
                        .await
                })
                .await;
            if let Err(err) = stop {
                warn!(
                    user_id,
                    channel_id = %existing.channel_id,
                    error = %err,
                    "failed to stop previous webhook channel"
                );
            }
        }

        let request = WatchRequest {
            channel_id: Uuid::new_v4().to_string(),
            address: self.config.callback_url.clone(),
            token: user_id.to_string(),
            expiration: Utc::now() + ChronoDuration::hours(self.config.channel_ttl_hours),
        };

        let channel = self
            .executor
            .run(user_id, RemoteOp::Watch, 0, || async {
                self.api
                    .watch_events(&token, WATCHED_CALENDAR, &request)
                    .await
            })
            .await?;

        state.webhook = Some(WebhookChannel {
            channel_id: channel.channel_id.clone(),
            resource_id: channel.resource_id.clone(),
            expires_at: channel.expires_at,
        });
        self.store.save_sync_state(&state).await?;

        info!(
            user_id,
            channel_id = %channel.channel_id,
            expires_at = %channel.expires_at,
            "webhook channel registered"
        );
        Ok(channel)
    }

    /// Authenticate and act on an inbound notification.
    ///
    /// The verification token is the only authentication here, so a
    /// missing or mismatched token is rejected outright — a caller
    /// reaching the endpoint must not be able to trigger syncs for
    /// arbitrary users.
    pub async fn handle_notification(
        &self,
        raw: RawNotification,
    ) -> CalmirResult<NotificationOutcome> {
        let notification = raw.validate()?;

        if notification.state == ResourceState::Sync {
            debug!(channel_id = %notification.channel_id, "channel handshake acknowledged");
            return Ok(NotificationOutcome::Acknowledged);
        }

        let state = self
            .store
            .find_by_channel(&notification.channel_id)
            .await?
            .ok_or_else(|| {
                CalmirError::NotFound(format!(
                    "unknown webhook channel '{}'",
                    notification.channel_id
                ))
            })?;

        let registered = state.webhook.as_ref().ok_or_else(|| {
            CalmirError::NotFound(format!(
                "no webhook registration for user '{}'",
                state.user_id
            ))
        })?;

        if registered.resource_id != notification.resource_id {
            return Err(CalmirError::InvalidRequest(format!(
                "resource id mismatch on channel '{}'",
                notification.channel_id
            )));
        }

        if notification.token.as_deref() != Some(state.user_id.as_str()) {
            return Err(CalmirError::Unauthorized(format!(
                "verification token mismatch on channel '{}'",
                notification.channel_id
            )));
        }

        if !self.debouncer.acquire(&notification.channel_id) {
            debug!(
                channel_id = %notification.channel_id,
                "notification coalesced within debounce window"
            );
            return Ok(NotificationOutcome::Debounced);
        }

        match notification.state {
            ResourceState::Exists => {
                self.scheduler
                    .schedule_incremental_sync(&state.user_id, None)
                    .await?;
                Ok(NotificationOutcome::SyncScheduled)
            }
            ResourceState::NotExists => {
                info!(
                    channel_id = %notification.channel_id,
                    "watched resource no longer exists"
                );
                Ok(NotificationOutcome::Ignored)
            }
            ResourceState::Sync => Ok(NotificationOutcome::Acknowledged),
        }
    }

    /// Re-register every channel expiring within the renewal buffer,
    /// isolating per-user failures.
    pub async fn renew_expiring(&self) -> CalmirResult<RenewalReport> {
        let cutoff = Utc::now() + ChronoDuration::hours(self.config.renewal_buffer_hours);
        let states = self.store.channels_expiring_before(cutoff).await?;

        let mut report = RenewalReport::default();
        for state in states {
            match self.register_channel(&state.user_id).await {
                Ok(_) => report.renewed += 1,
                Err(err) => {
                    warn!(
                        user_id = %state.user_id,
                        error = %err,
                        "webhook renewal failed"
                    );
                    report.failures.push((state.user_id, err.to_string()));
                }
            }
        }
        Ok(report)
    }
}
