//! Per-user sync state: status, continuation tokens, checkpointing and
//! the webhook channel registration.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    FullSync,
    IncrementalSync,
    Error,
    Paused,
}

/// Progress marker persisted after every full-sync page so an
/// interrupted rebuild resumes from the last completed page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullSyncCheckpoint {
    /// Calendar being walked when the checkpoint was taken.
    pub calendar_id: String,
    /// Continuation for the next page within that calendar.
    pub page_token: Option<String>,
    pub events_processed: u64,
    pub started_at: DateTime<Utc>,
}

/// Push-notification channel registration. Exists only inside
/// SyncState, not as a separate entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChannel {
    pub channel_id: String,
    pub resource_id: String,
    pub expires_at: DateTime<Utc>,
}

/// One row per user, created lazily on first sync. Mutated only by the
/// sync engine and webhook manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub user_id: String,
    pub status: SyncStatus,

    /// Continuation tokens keyed by remote calendar id. The remote
    /// system issues one token per calendar; full sync accumulates the
    /// final token for every calendar it walks.
    pub sync_tokens: BTreeMap<String, String>,
    pub sync_tokens_updated_at: Option<DateTime<Utc>>,

    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_full_sync_at: Option<DateTime<Utc>>,

    pub checkpoint: Option<FullSyncCheckpoint>,
    pub webhook: Option<WebhookChannel>,

    // Downstream indexing counters.
    pub events_pending_index: u64,
    pub events_indexed: u64,

    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    pub fn new(user_id: &str) -> SyncState {
        SyncState {
            user_id: user_id.to_string(),
            status: SyncStatus::Idle,
            sync_tokens: BTreeMap::new(),
            sync_tokens_updated_at: None,
            last_sync_at: None,
            last_full_sync_at: None,
            checkpoint: None,
            webhook: None,
            events_pending_index: 0,
            events_indexed: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether incremental sync can run at all.
    pub fn has_sync_tokens(&self) -> bool {
        !self.sync_tokens.is_empty()
    }

    pub fn set_status(&mut self, status: SyncStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.status = SyncStatus::Error;
        self.last_error = Some(message.into());
        self.updated_at = Utc::now();
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    pub fn store_sync_token(&mut self, calendar_id: &str, token: String) {
        self.sync_tokens.insert(calendar_id.to_string(), token);
        self.sync_tokens_updated_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Drop one calendar's token, e.g. after the remote reports it
    /// expired.
    pub fn clear_sync_token(&mut self, calendar_id: &str) {
        self.sync_tokens.remove(calendar_id);
        self.sync_tokens_updated_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}
