//! Persistence contracts.
//!
//! The engine treats storage as an external collaborator behind these
//! traits. The upsert semantics are load-bearing: matching is by
//! natural key with soft-deleted rows excluded, so a sync can never
//! resurrect a deletion. [`memory::MemoryStore`] is the reference
//! implementation and the store used by tests.

pub mod memory;

use async_trait::async_trait;
use calmir_core::approval::{Approval, ApprovalStatus};
use calmir_core::calendar::Calendar;
use calmir_core::error::CalmirResult;
use calmir_core::event::Event;
use calmir_core::remote::protocol::{RemoteCalendar, RemoteEvent};
use calmir_core::sync_state::SyncState;
use calmir_core::time_window::TimeWindow;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Whether an upsert created a new row or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Added,
    Updated,
}

#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Insert or refresh a calendar from the remote list. An existing
    /// row keeps its `is_selected` / `is_hidden` flags.
    async fn upsert_calendar(
        &self,
        user_id: &str,
        remote: &RemoteCalendar,
    ) -> CalmirResult<Upserted>;

    async fn find_calendar(
        &self,
        user_id: &str,
        remote_calendar_id: &str,
    ) -> CalmirResult<Option<Calendar>>;

    async fn list_calendars(&self, user_id: &str) -> CalmirResult<Vec<Calendar>>;

    /// Calendars the user opted into event sync for.
    async fn selected_calendars(&self, user_id: &str) -> CalmirResult<Vec<Calendar>>;

    async fn set_calendar_selected(
        &self,
        user_id: &str,
        remote_calendar_id: &str,
        selected: bool,
    ) -> CalmirResult<()>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert or refresh the mirror row for a remote event.
    ///
    /// Matches the newest non-deleted row for
    /// `(user_id, remote.id)`; soft-deleted rows are excluded from the
    /// match so they stay deleted.
    async fn upsert_event(
        &self,
        user_id: &str,
        calendar_id: &str,
        remote: &RemoteEvent,
    ) -> CalmirResult<(Upserted, Event)>;

    /// Newest non-deleted row for the remote id.
    async fn find_by_remote_id(
        &self,
        user_id: &str,
        remote_event_id: &str,
    ) -> CalmirResult<Option<Event>>;

    async fn find_event(&self, user_id: &str, id: Uuid) -> CalmirResult<Option<Event>>;

    /// Soft-delete by remote id. Returns the affected row, if any row
    /// was live.
    async fn soft_delete_event(
        &self,
        user_id: &str,
        remote_event_id: &str,
    ) -> CalmirResult<Option<Event>>;

    /// Replace a mirror row wholesale (used after approval execution).
    async fn save_event(&self, event: &Event) -> CalmirResult<()>;

    /// Non-deleted events intersecting the window, for conflict scans.
    /// `calendar_id` narrows the scan to one calendar.
    async fn events_in_window(
        &self,
        user_id: &str,
        calendar_id: Option<&str>,
        window: &TimeWindow,
    ) -> CalmirResult<Vec<Event>>;
}

#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// The per-user row, created lazily on first access.
    async fn get_or_create_sync_state(&self, user_id: &str) -> CalmirResult<SyncState>;

    async fn save_sync_state(&self, state: &SyncState) -> CalmirResult<()>;

    /// Resolve a webhook channel id to its owning state.
    async fn find_by_channel(&self, channel_id: &str) -> CalmirResult<Option<SyncState>>;

    /// States whose webhook channel expires before the cutoff.
    async fn channels_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> CalmirResult<Vec<SyncState>>;
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn insert_approval(&self, approval: &Approval) -> CalmirResult<()>;

    async fn find_approval(&self, id: Uuid) -> CalmirResult<Option<Approval>>;

    async fn save_approval(&self, approval: &Approval) -> CalmirResult<()>;

    async fn list_approvals(
        &self,
        user_id: &str,
        status: Option<ApprovalStatus>,
    ) -> CalmirResult<Vec<Approval>>;

    /// Pending rows whose expiry has passed.
    async fn pending_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> CalmirResult<Vec<Approval>>;
}

/// The full persistence surface the engine needs.
pub trait MirrorStore:
    CalendarStore + EventStore + SyncStateStore + ApprovalStore
{
}

impl<T: CalendarStore + EventStore + SyncStateStore + ApprovalStore> MirrorStore for T {}
