//! In-memory store.
//!
//! Reference implementation of the persistence contracts, used by
//! tests and as the executable definition of the upsert semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use calmir_core::approval::{Approval, ApprovalStatus};
use calmir_core::calendar::Calendar;
use calmir_core::error::CalmirResult;
use calmir_core::event::Event;
use calmir_core::remote::protocol::{RemoteCalendar, RemoteEvent};
use calmir_core::sync_state::SyncState;
use calmir_core::time_window::TimeWindow;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{
    ApprovalStore, CalendarStore, EventStore, SyncStateStore, Upserted,
};

#[derive(Default)]
pub struct MemoryStore {
    calendars: RwLock<HashMap<(String, String), Calendar>>,
    events: RwLock<Vec<Event>>,
    sync_states: RwLock<HashMap<String, SyncState>>,
    approvals: RwLock<HashMap<Uuid, Approval>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

#[async_trait]
impl CalendarStore for MemoryStore {
    async fn upsert_calendar(
        &self,
        user_id: &str,
        remote: &RemoteCalendar,
    ) -> CalmirResult<Upserted> {
        let mut calendars = self.calendars.write().await;
        let key = (user_id.to_string(), remote.id.clone());

        match calendars.get_mut(&key) {
            Some(existing) => {
                existing.apply_remote(remote);
                Ok(Upserted::Updated)
            }
            None => {
                calendars.insert(key, Calendar::from_remote(user_id, remote));
                Ok(Upserted::Added)
            }
        }
    }

    async fn find_calendar(
        &self,
        user_id: &str,
        remote_calendar_id: &str,
    ) -> CalmirResult<Option<Calendar>> {
        let calendars = self.calendars.read().await;
        Ok(calendars
            .get(&(user_id.to_string(), remote_calendar_id.to_string()))
            .cloned())
    }

    async fn list_calendars(&self, user_id: &str) -> CalmirResult<Vec<Calendar>> {
        let calendars = self.calendars.read().await;
        let mut list: Vec<Calendar> = calendars
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.remote_calendar_id.cmp(&b.remote_calendar_id));
        Ok(list)
    }

    async fn selected_calendars(&self, user_id: &str) -> CalmirResult<Vec<Calendar>> {
        Ok(self
            .list_calendars(user_id)
            .await?
            .into_iter()
            .filter(|c| c.is_selected)
            .collect())
    }

    async fn set_calendar_selected(
        &self,
        user_id: &str,
        remote_calendar_id: &str,
        selected: bool,
    ) -> CalmirResult<()> {
        let mut calendars = self.calendars.write().await;
        if let Some(calendar) =
            calendars.get_mut(&(user_id.to_string(), remote_calendar_id.to_string()))
        {
            calendar.is_selected = selected;
            calendar.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn upsert_event(
        &self,
        user_id: &str,
        calendar_id: &str,
        remote: &RemoteEvent,
    ) -> CalmirResult<(Upserted, Event)> {
        let mut events = self.events.write().await;

        // Match-then-update: the newest non-deleted row for the key.
        // Soft-deleted rows are excluded so the upsert cannot revive
        // them.
        let existing = events
            .iter_mut()
            .filter(|e| {
                e.user_id == user_id
                    && e.remote_event_id == remote.id
                    && !e.is_deleted()
            })
            .max_by_key(|e| e.updated_at);

        match existing {
            Some(event) => {
                event.apply_remote(remote)?;
                event.calendar_id = calendar_id.to_string();
                Ok((Upserted::Updated, event.clone()))
            }
            None => {
                let event = Event::from_remote(user_id, calendar_id, remote)?;
                events.push(event.clone());
                Ok((Upserted::Added, event))
            }
        }
    }

    async fn find_by_remote_id(
        &self,
        user_id: &str,
        remote_event_id: &str,
    ) -> CalmirResult<Option<Event>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.remote_event_id == remote_event_id
                    && !e.is_deleted()
            })
            .max_by_key(|e| e.updated_at)
            .cloned())
    }

    async fn find_event(&self, user_id: &str, id: Uuid) -> CalmirResult<Option<Event>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .find(|e| e.user_id == user_id && e.id == id)
            .cloned())
    }

    async fn soft_delete_event(
        &self,
        user_id: &str,
        remote_event_id: &str,
    ) -> CalmirResult<Option<Event>> {
        let mut events = self.events.write().await;
        let live = events
            .iter_mut()
            .filter(|e| {
                e.user_id == user_id
                    && e.remote_event_id == remote_event_id
                    && !e.is_deleted()
            })
            .max_by_key(|e| e.updated_at);

        Ok(live.map(|event| {
            event.soft_delete(Utc::now());
            event.clone()
        }))
    }

    async fn save_event(&self, event: &Event) -> CalmirResult<()> {
        let mut events = self.events.write().await;
        match events.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event.clone(),
            None => events.push(event.clone()),
        }
        Ok(())
    }

    async fn events_in_window(
        &self,
        user_id: &str,
        calendar_id: Option<&str>,
        window: &TimeWindow,
    ) -> CalmirResult<Vec<Event>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.user_id == user_id && !e.is_deleted())
            .filter(|e| calendar_id.is_none_or(|cal| cal == e.calendar_id))
            .filter(|e| window.intersects(e.start, e.end))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SyncStateStore for MemoryStore {
    async fn get_or_create_sync_state(&self, user_id: &str) -> CalmirResult<SyncState> {
        let mut states = self.sync_states.write().await;
        Ok(states
            .entry(user_id.to_string())
            .or_insert_with(|| SyncState::new(user_id))
            .clone())
    }

    async fn save_sync_state(&self, state: &SyncState) -> CalmirResult<()> {
        let mut states = self.sync_states.write().await;
        states.insert(state.user_id.clone(), state.clone());
        Ok(())
    }

    async fn find_by_channel(&self, channel_id: &str) -> CalmirResult<Option<SyncState>> {
        let states = self.sync_states.read().await;
        Ok(states
            .values()
            .find(|s| {
                s.webhook
                    .as_ref()
                    .is_some_and(|w| w.channel_id == channel_id)
            })
            .cloned())
    }

    async fn channels_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> CalmirResult<Vec<SyncState>> {
        let states = self.sync_states.read().await;
        Ok(states
            .values()
            .filter(|s| {
                s.webhook
                    .as_ref()
                    .is_some_and(|w| w.expires_at < cutoff)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ApprovalStore for MemoryStore {
    async fn insert_approval(&self, approval: &Approval) -> CalmirResult<()> {
        let mut approvals = self.approvals.write().await;
        approvals.insert(approval.id, approval.clone());
        Ok(())
    }

    async fn find_approval(&self, id: Uuid) -> CalmirResult<Option<Approval>> {
        let approvals = self.approvals.read().await;
        Ok(approvals.get(&id).cloned())
    }

    async fn save_approval(&self, approval: &Approval) -> CalmirResult<()> {
        let mut approvals = self.approvals.write().await;
        approvals.insert(approval.id, approval.clone());
        Ok(())
    }

    async fn list_approvals(
        &self,
        user_id: &str,
        status: Option<ApprovalStatus>,
    ) -> CalmirResult<Vec<Approval>> {
        let approvals = self.approvals.read().await;
        let mut list: Vec<Approval> = approvals
            .values()
            .filter(|a| a.user_id == user_id)
            .filter(|a| status.is_none_or(|s| s == a.status))
            .cloned()
            .collect();
        list.sort_by_key(|a| a.created_at);
        Ok(list)
    }

    async fn pending_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> CalmirResult<Vec<Approval>> {
        let approvals = self.approvals.read().await;
        let mut list: Vec<Approval> = approvals
            .values()
            .filter(|a| a.status == ApprovalStatus::Pending && a.expires_at < cutoff)
            .cloned()
            .collect();
        list.sort_by_key(|a| a.expires_at);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use calmir_core::event::{EventStatus, EventVisibility};
    use calmir_core::remote::protocol::{AccessRole, EventTime};
    use chrono::TimeZone;

    use super::*;

    fn remote_event(id: &str, summary: &str) -> RemoteEvent {
        RemoteEvent {
            id: id.to_string(),
            status: EventStatus::Confirmed,
            summary: summary.to_string(),
            description: None,
            location: None,
            start: Some(EventTime::DateTime {
                utc: Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
                timezone: None,
            }),
            end: Some(EventTime::DateTime {
                utc: Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
                timezone: None,
            }),
            visibility: EventVisibility::Default,
            attendees: None,
            organizer: None,
            recurrence: None,
            conference: None,
            updated: None,
        }
    }

    fn remote_calendar(id: &str) -> RemoteCalendar {
        RemoteCalendar {
            id: id.to_string(),
            summary: format!("Calendar {id}"),
            description: None,
            timezone: None,
            color_id: None,
            access_role: AccessRole::Owner,
            primary: false,
        }
    }

    #[tokio::test]
    async fn test_event_upsert_dedup_invariant() {
        let store = MemoryStore::new();

        for step in 0..3 {
            let remote = remote_event("evt-1", &format!("v{step}"));
            store.upsert_event("user-1", "cal-1", &remote).await.unwrap();

            let events = store.events.read().await;
            let live = events
                .iter()
                .filter(|e| e.remote_event_id == "evt-1" && !e.is_deleted())
                .count();
            assert_eq!(live, 1, "at most one live row after step {step}");
        }

        let found = store.find_by_remote_id("user-1", "evt-1").await.unwrap();
        assert_eq!(found.unwrap().summary, "v2");
    }

    #[tokio::test]
    async fn test_upsert_does_not_resurrect_soft_deleted_rows() {
        let store = MemoryStore::new();
        store
            .upsert_event("user-1", "cal-1", &remote_event("evt-1", "original"))
            .await
            .unwrap();
        store.soft_delete_event("user-1", "evt-1").await.unwrap();

        let (outcome, row) = store
            .upsert_event("user-1", "cal-1", &remote_event("evt-1", "reborn"))
            .await
            .unwrap();

        // A new row is created; the deleted one stays deleted.
        assert_eq!(outcome, Upserted::Added);
        assert!(!row.is_deleted());
        let events = store.events.read().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events.iter().filter(|e| e.is_deleted()).count(), 1);
    }

    #[tokio::test]
    async fn test_soft_delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .upsert_event("user-1", "cal-1", &remote_event("evt-1", "x"))
            .await
            .unwrap();

        assert!(store.soft_delete_event("user-1", "evt-1").await.unwrap().is_some());
        assert!(store.soft_delete_event("user-1", "evt-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_calendar_upsert_preserves_selection() {
        let store = MemoryStore::new();
        store
            .upsert_calendar("user-1", &remote_calendar("cal-1"))
            .await
            .unwrap();
        store
            .set_calendar_selected("user-1", "cal-1", true)
            .await
            .unwrap();

        store
            .upsert_calendar("user-1", &remote_calendar("cal-1"))
            .await
            .unwrap();

        let calendar = store
            .find_calendar("user-1", "cal-1")
            .await
            .unwrap()
            .unwrap();
        assert!(calendar.is_selected);
    }

    #[tokio::test]
    async fn test_events_in_window_excludes_deleted() {
        let store = MemoryStore::new();
        store
            .upsert_event("user-1", "cal-1", &remote_event("evt-1", "keep"))
            .await
            .unwrap();
        store
            .upsert_event("user-1", "cal-1", &remote_event("evt-2", "drop"))
            .await
            .unwrap();
        store.soft_delete_event("user-1", "evt-2").await.unwrap();

        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 3, 0, 0, 0).unwrap(),
        );
        let events = store
            .events_in_window("user-1", None, &window)
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].remote_event_id, "evt-1");
    }

    #[tokio::test]
    async fn test_sync_state_is_created_lazily() {
        let store = MemoryStore::new();
        let state = store.get_or_create_sync_state("user-1").await.unwrap();
        assert_eq!(state.user_id, "user-1");
        assert!(!state.has_sync_tokens());
    }
}
