//! The locally mirrored event row.
//!
//! Events are a normalized mirror of the remote system's events. The
//! engine works exclusively with these rows for conflict detection and
//! approval execution; providers never see them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CalmirError, CalmirResult};
use crate::remote::protocol::{EventPayload, EventTime, RemoteEvent};

/// A mirrored calendar event.
///
/// Identity invariant: at most one non-deleted row exists per
/// `(user_id, remote_event_id)`. Store upserts match on that key while
/// excluding soft-deleted rows, so a sync never resurrects a deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub user_id: String,
    /// Remote id of the calendar this event belongs to.
    pub calendar_id: String,
    pub remote_event_id: String,

    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,

    /// Start instant, UTC. All-day events store midnight UTC.
    pub start: DateTime<Utc>,
    /// End instant, UTC, exclusive. All-day events keep the remote
    /// system's exclusive end-date-plus-one convention.
    pub end: DateTime<Utc>,
    pub all_day: bool,
    /// Source timezone of a timed event, kept separately from the UTC
    /// instants.
    pub timezone: Option<String>,

    pub status: EventStatus,
    pub visibility: EventVisibility,

    // Structured payloads from the remote system, kept opaque.
    pub attendees: Option<serde_json::Value>,
    pub organizer: Option<serde_json::Value>,
    pub recurrence: Option<serde_json::Value>,
    pub conference: Option<serde_json::Value>,

    pub remote_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; set instead of removing the row.
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventVisibility {
    #[default]
    Default,
    Public,
    Private,
}

impl Event {
    /// Build a mirror row from a live remote event.
    ///
    /// Cancelled delta stubs have no start/end and must be handled as
    /// deletions before reaching this; a live event without both is
    /// rejected.
    pub fn from_remote(
        user_id: &str,
        calendar_id: &str,
        remote: &RemoteEvent,
    ) -> CalmirResult<Event> {
        let (start, end) = remote_times(remote)?;
        let now = Utc::now();

        Ok(Event {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            calendar_id: calendar_id.to_string(),
            remote_event_id: remote.id.clone(),
            summary: remote.summary.clone(),
            description: remote.description.clone(),
            location: remote.location.clone(),
            start: start.to_utc(),
            end: end.to_utc(),
            all_day: start.is_all_day(),
            timezone: start.timezone().map(str::to_string),
            status: remote.status,
            visibility: remote.visibility,
            attendees: remote.attendees.clone(),
            organizer: remote.organizer.clone(),
            recurrence: remote.recurrence.clone(),
            conference: remote.conference.clone(),
            remote_updated_at: remote.updated,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Overwrite mirrored fields from a fresh remote payload, keeping
    /// local identity (row id, created_at) intact.
    pub fn apply_remote(&mut self, remote: &RemoteEvent) -> CalmirResult<()> {
        let (start, end) = remote_times(remote)?;

        self.summary = remote.summary.clone();
        self.description = remote.description.clone();
        self.location = remote.location.clone();
        self.start = start.to_utc();
        self.end = end.to_utc();
        self.all_day = start.is_all_day();
        self.timezone = start.timezone().map(str::to_string);
        self.status = remote.status;
        self.visibility = remote.visibility;
        self.attendees = remote.attendees.clone();
        self.organizer = remote.organizer.clone();
        self.recurrence = remote.recurrence.clone();
        self.conference = remote.conference.clone();
        self.remote_updated_at = remote.updated;
        self.updated_at = Utc::now();

        Ok(())
    }

    /// Start/end as the remote system expresses them, for building
    /// update payloads.
    pub fn event_times(&self) -> (EventTime, EventTime) {
        if self.all_day {
            (
                EventTime::Date(self.start.date_naive()),
                EventTime::Date(self.end.date_naive()),
            )
        } else {
            (
                EventTime::DateTime {
                    utc: self.start,
                    timezone: self.timezone.clone(),
                },
                EventTime::DateTime {
                    utc: self.end,
                    timezone: self.timezone.clone(),
                },
            )
        }
    }

    /// Full-replacement payload carrying the mirrored state back to the
    /// remote system.
    pub fn to_update_payload(&self) -> EventPayload {
        let (start, end) = self.event_times();
        EventPayload {
            summary: Some(self.summary.clone()),
            description: self.description.clone(),
            location: self.location.clone(),
            start: Some(start),
            end: Some(end),
            visibility: Some(self.visibility),
            attendees: self.attendees.clone(),
            recurrence: self.recurrence.clone(),
            conference: self.conference.clone(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
        self.updated_at = at;
    }
}

fn remote_times(remote: &RemoteEvent) -> CalmirResult<(&EventTime, &EventTime)> {
    match (&remote.start, &remote.end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(CalmirError::InvalidRequest(format!(
            "remote event '{}' is missing start or end",
            remote.id
        ))),
    }
}
