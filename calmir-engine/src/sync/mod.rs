//! The synchronization engine.
//!
//! Two cooperating modes keep the mirror current: [`full`] rebuilds it
//! from a bulk walk of every selected calendar (checkpointed so an
//! interrupted run resumes from the last completed page), and
//! [`incremental`] applies deltas from per-calendar continuation
//! tokens. Token expiry fails over from incremental back to full via
//! the distinct `SyncRequired` condition.

pub mod full;
pub mod incremental;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calmir_core::config::SyncConfig;
use calmir_core::error::CalmirResult;
use calmir_core::event::Event;
use calmir_core::remote::protocol::{CalendarApi, RemoteEvent};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::credentials::CredentialProvider;
use crate::executor::RemoteExecutor;
use crate::store::{EventStore, MirrorStore, Upserted};
use crate::sync::full::FullSyncOptions;

/// Downstream indexing contract (embedding/search pipeline). Touched
/// event ids are queued in bounded batches, never the whole run at
/// once.
#[async_trait]
pub trait IndexSink: Send + Sync {
    async fn enqueue_events(&self, user_id: &str, event_ids: Vec<Uuid>);
}

/// Discards everything. Default for tests.
pub struct NullIndexSink;

#[async_trait]
impl IndexSink for NullIndexSink {
    async fn enqueue_events(&self, _user_id: &str, _event_ids: Vec<Uuid>) {}
}

/// A non-fatal, per-resource failure inside a sync run.
#[derive(Debug, Clone)]
pub struct ResourceError {
    pub calendar_id: String,
    pub message: String,
}

/// What a sync run did.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub calendars_processed: u32,
    pub events_added: u64,
    pub events_updated: u64,
    pub events_deleted: u64,
    pub duration: Duration,
    pub errors: Vec<ResourceError>,
}

impl SyncReport {
    pub fn events_touched(&self) -> u64 {
        self.events_added + self.events_updated + self.events_deleted
    }
}

/// Fixed phase vocabulary for full sync progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FullSyncPhase {
    Calendars,
    Events,
    Complete,
}

/// Fixed phase vocabulary for incremental sync progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrementalSyncPhase {
    Fetching,
    Processing,
    Complete,
}

#[derive(Debug, Clone)]
pub enum SyncProgress {
    Full {
        phase: FullSyncPhase,
        calendars_processed: u32,
        events_processed: u64,
    },
    Incremental {
        phase: IncrementalSyncPhase,
        calendars_processed: u32,
        changes_processed: u64,
    },
}

/// Progress callback invoked as a run advances through its phases.
pub type ProgressFn = Arc<dyn Fn(SyncProgress) + Send + Sync>;

/// The sync engine. All remote traffic goes through the executor; all
/// persistence through the store contract.
pub struct SyncEngine {
    pub(crate) store: Arc<dyn MirrorStore>,
    pub(crate) api: Arc<dyn CalendarApi>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) executor: Arc<RemoteExecutor>,
    pub(crate) index: Arc<dyn IndexSink>,
    pub(crate) config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        api: Arc<dyn CalendarApi>,
        credentials: Arc<dyn CredentialProvider>,
        executor: Arc<RemoteExecutor>,
        index: Arc<dyn IndexSink>,
        config: SyncConfig,
    ) -> SyncEngine {
        SyncEngine {
            store,
            api,
            credentials,
            executor,
            index,
            config,
        }
    }

    /// Checkpointed bulk rebuild of the mirror.
    pub async fn full_sync(
        &self,
        user_id: &str,
        options: FullSyncOptions,
        progress: Option<ProgressFn>,
    ) -> CalmirResult<SyncReport> {
        full::run(self, user_id, options, progress).await
    }

    /// Delta sync from the stored continuation tokens. Raises
    /// `SyncRequired` when tokens are absent or expired so the caller
    /// can reschedule as a full sync.
    pub async fn incremental_sync(
        &self,
        user_id: &str,
        progress: Option<ProgressFn>,
    ) -> CalmirResult<SyncReport> {
        incremental::run(self, user_id, progress).await
    }
}

/// Effect one remote item had on the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemChange {
    Added(Uuid),
    Updated(Uuid),
    Deleted(Uuid),
    Skipped,
}

/// Apply one remote item: cancelled → soft-delete if mirrored, live →
/// upsert with added-vs-updated decided by local existence.
pub(crate) async fn apply_remote_item(
    store: &Arc<dyn MirrorStore>,
    user_id: &str,
    calendar_id: &str,
    item: &RemoteEvent,
) -> CalmirResult<ItemChange> {
    if item.is_cancelled() {
        return Ok(match store.soft_delete_event(user_id, &item.id).await? {
            Some(event) => ItemChange::Deleted(event.id),
            None => ItemChange::Skipped,
        });
    }

    let (outcome, event) = store.upsert_event(user_id, calendar_id, item).await?;
    debug!(
        user_id,
        calendar_id,
        remote_event_id = %item.id,
        ?outcome,
        "mirrored remote event"
    );
    Ok(match outcome {
        Upserted::Added => ItemChange::Added(event.id),
        Upserted::Updated => ItemChange::Updated(event.id),
    })
}

/// Queue touched ids for downstream indexing in bounded batches and
/// bump the pending counter on the state the caller persists.
pub(crate) async fn queue_for_indexing(
    index: &Arc<dyn IndexSink>,
    user_id: &str,
    touched: &mut Vec<Uuid>,
    batch_size: usize,
) -> u64 {
    let queued = touched.len() as u64;
    for batch in touched.chunks(batch_size.max(1)) {
        index.enqueue_events(user_id, batch.to_vec()).await;
    }
    touched.clear();
    queued
}

/// Fold one item's effect into the running report and touched-id list.
pub(crate) fn record_change(
    report: &mut SyncReport,
    touched: &mut Vec<Uuid>,
    change: ItemChange,
) {
    match change {
        ItemChange::Added(id) => {
            report.events_added += 1;
            touched.push(id);
        }
        ItemChange::Updated(id) => {
            report.events_updated += 1;
            touched.push(id);
        }
        ItemChange::Deleted(id) => {
            report.events_deleted += 1;
            touched.push(id);
        }
        ItemChange::Skipped => {}
    }
}

impl SyncEngine {
    /// Non-deleted mirror rows intersecting a window; convenience for
    /// conflict scans.
    pub async fn events_in_window(
        &self,
        user_id: &str,
        calendar_id: Option<&str>,
        window: &calmir_core::time_window::TimeWindow,
    ) -> CalmirResult<Vec<Event>> {
        self.store.events_in_window(user_id, calendar_id, window).await
    }
}
