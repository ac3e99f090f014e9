//! The human-gated mutation workflow.
//!
//! A proposed calendar mutation is persisted as an [`Approval`] and
//! walked through a small state machine: `pending` is the only
//! non-terminal entry state, `approved` the only state execution
//! accepts, and `rejected` / `expired` / `executed` / `failed` are
//! terminal. There are no back-transitions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conflict::Conflict;
use crate::event::EventVisibility;
use crate::remote::protocol::{EventPayload, EventTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Executed,
    Failed,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApprovalStatus::Rejected
                | ApprovalStatus::Expired
                | ApprovalStatus::Executed
                | ApprovalStatus::Failed
        )
    }
}

/// The kind of mutation an approval proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    Respond,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
            ActionType::Respond => "respond",
        };
        f.write_str(s)
    }
}

/// A new event as proposed for creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(default)]
    pub visibility: EventVisibility,
    pub attendees: Option<serde_json::Value>,
    pub recurrence: Option<serde_json::Value>,
    pub conference: Option<serde_json::Value>,
}

impl EventDraft {
    pub fn to_payload(&self) -> EventPayload {
        EventPayload {
            summary: Some(self.summary.clone()),
            description: self.description.clone(),
            location: self.location.clone(),
            start: Some(self.start.clone()),
            end: Some(self.end.clone()),
            visibility: Some(self.visibility),
            attendees: self.attendees.clone(),
            recurrence: self.recurrence.clone(),
            conference: self.conference.clone(),
        }
    }
}

/// Partial update of an existing event; `None` fields stay unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub visibility: Option<EventVisibility>,
    pub attendees: Option<serde_json::Value>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.visibility.is_none()
            && self.attendees.is_none()
    }

    pub fn to_payload(&self) -> EventPayload {
        EventPayload {
            summary: self.summary.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            visibility: self.visibility,
            attendees: self.attendees.clone(),
            recurrence: None,
            conference: None,
        }
    }
}

/// RSVP decision for the authenticated attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpResponse {
    Accepted,
    Declined,
    Tentative,
}

impl RsvpResponse {
    /// Wire value of the remote system's attendee response status.
    pub fn as_remote_str(&self) -> &'static str {
        match self {
            RsvpResponse::Accepted => "accepted",
            RsvpResponse::Declined => "declined",
            RsvpResponse::Tentative => "tentative",
        }
    }
}

/// The intended mutation, snapshotted at request time.
///
/// Tagged by `action_type` so the execution dispatch is exhaustive over
/// a closed set of variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ProposedAction {
    Create {
        draft: EventDraft,
    },
    Update {
        event_id: Uuid,
        patch: EventPatch,
    },
    Delete {
        event_id: Uuid,
    },
    Respond {
        event_id: Uuid,
        response: RsvpResponse,
    },
}

impl ProposedAction {
    pub fn kind(&self) -> ActionType {
        match self {
            ProposedAction::Create { .. } => ActionType::Create,
            ProposedAction::Update { .. } => ActionType::Update,
            ProposedAction::Delete { .. } => ActionType::Delete,
            ProposedAction::Respond { .. } => ActionType::Respond,
        }
    }

    /// Local event row the action targets, when it targets one.
    pub fn target_event_id(&self) -> Option<Uuid> {
        match self {
            ProposedAction::Create { .. } => None,
            ProposedAction::Update { event_id, .. }
            | ProposedAction::Delete { event_id }
            | ProposedAction::Respond { event_id, .. } => Some(*event_id),
        }
    }
}

/// A persisted, human-gated proposal to mutate the remote calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub user_id: String,
    /// Remote id of the calendar the action applies to.
    pub calendar_id: String,
    pub action: ProposedAction,
    /// Conflicts detected at request time; not re-derived at execution.
    pub conflicts: Vec<Conflict>,
    pub status: ApprovalStatus,
    /// Who asked for this (an agent tag or API client name).
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    /// Local event row produced or touched by execution.
    pub result_event_id: Option<Uuid>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Approval {
    pub fn new(
        user_id: &str,
        calendar_id: &str,
        action: ProposedAction,
        conflicts: Vec<Conflict>,
        requested_by: &str,
        expiry_hours: i64,
    ) -> Approval {
        let now = Utc::now();
        Approval {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            calendar_id: calendar_id.to_string(),
            action,
            conflicts,
            status: ApprovalStatus::Pending,
            requested_by: requested_by.to_string(),
            created_at: now,
            expires_at: now + Duration::hours(expiry_hours),
            decided_at: None,
            decided_by: None,
            result_event_id: None,
            error: None,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && now > self.expires_at
    }
}
