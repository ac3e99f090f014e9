//! Wire types and the operation contract for remote calendar systems.
//!
//! Each operation has a fixed quota-unit cost ([`RemoteOp::units`]);
//! the engine secures that budget through the rate limiter before any
//! call is made.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CalmirResult;
use crate::event::{EventStatus, EventVisibility};
use crate::remote::AccessToken;
use crate::time_window::TimeWindow;

/// Event start/end as the remote system expresses it: a timed instant
/// (with the source timezone kept alongside) or an all-day date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTime {
    DateTime {
        utc: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
    Date(NaiveDate),
}

impl EventTime {
    /// UTC instant for ordering and storage. All-day dates resolve to
    /// midnight UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::DateTime { utc, .. } => *utc,
            // Midnight always exists
            EventTime::Date(d) => d.and_hms_opt(0, 0, 0).unwrap().and_utc(),
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    pub fn timezone(&self) -> Option<&str> {
        match self {
            EventTime::DateTime { timezone, .. } => timezone.as_deref(),
            EventTime::Date(_) => None,
        }
    }
}

/// A calendar event as returned by the remote system.
///
/// Delta feeds deliver cancelled events as id-and-status stubs, so
/// start/end are optional here; live events always carry both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub id: String,
    pub status: EventStatus,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    #[serde(default)]
    pub visibility: EventVisibility,
    /// Attendee list as the remote system's structured payload.
    pub attendees: Option<serde_json::Value>,
    pub organizer: Option<serde_json::Value>,
    pub recurrence: Option<serde_json::Value>,
    pub conference: Option<serde_json::Value>,
    pub updated: Option<DateTime<Utc>>,
}

impl RemoteEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status == EventStatus::Cancelled
    }
}

/// Mutation payload sent to the remote system for inserts, updates and
/// patches. `None` fields are omitted from the request (left unchanged
/// on patch).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPayload {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub visibility: Option<EventVisibility>,
    pub attendees: Option<serde_json::Value>,
    pub recurrence: Option<serde_json::Value>,
    pub conference: Option<serde_json::Value>,
}

/// Query parameters for an event listing or delta fetch.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub window: Option<TimeWindow>,
    pub page_token: Option<String>,
    /// Continuation token for delta fetches. Mutually exclusive with
    /// `window` at the remote system.
    pub sync_token: Option<String>,
    pub show_deleted: bool,
    pub single_events: bool,
    pub max_results: u32,
}

/// One page of events plus continuation cursors. `next_sync_token`
/// appears only on the final page of a listing.
#[derive(Debug, Clone, Default)]
pub struct EventsPage {
    pub items: Vec<RemoteEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// A calendar as returned by the remote calendar list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCalendar {
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    pub timezone: Option<String>,
    pub color_id: Option<String>,
    pub access_role: AccessRole,
    #[serde(default)]
    pub primary: bool,
}

/// Access the authenticated user holds on a calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessRole {
    Owner,
    Writer,
    Reader,
    FreeBusyReader,
}

impl AccessRole {
    pub fn can_write(&self) -> bool {
        matches!(self, AccessRole::Owner | AccessRole::Writer)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CalendarListPage {
    pub items: Vec<RemoteCalendar>,
    pub next_page_token: Option<String>,
}

/// Request to open a push-notification channel on a calendar.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    /// Caller-generated unguessable channel id.
    pub channel_id: String,
    /// HTTPS address notifications are delivered to.
    pub address: String,
    /// Verification token echoed back on every notification.
    pub token: String,
    /// Requested expiration, bounded by the remote system's maximum
    /// channel lifetime. The response carries the granted value.
    pub expiration: DateTime<Utc>,
}

/// An open push-notification channel as granted by the remote system.
#[derive(Debug, Clone)]
pub struct WatchChannel {
    pub channel_id: String,
    pub resource_id: String,
    pub expires_at: DateTime<Utc>,
}

/// A user-level setting (e.g. default timezone) on the remote system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSetting {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct FreeBusyRequest {
    pub window: TimeWindow,
    pub calendar_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Busy intervals keyed by calendar id.
#[derive(Debug, Clone, Default)]
pub struct FreeBusyResponse {
    pub busy: BTreeMap<String, Vec<BusyInterval>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorDefinition {
    pub background: String,
    pub foreground: String,
}

/// Color palettes for events and calendars.
#[derive(Debug, Clone, Default)]
pub struct Colors {
    pub event: BTreeMap<String, ColorDefinition>,
    pub calendar: BTreeMap<String, ColorDefinition>,
}

/// Remote operations and their fixed quota-unit costs: reads cost 1,
/// writes cost 2, opening a watch channel costs 2, closing one costs 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOp {
    CalendarList,
    CalendarGet,
    EventsList,
    EventGet,
    EventInsert,
    EventUpdate,
    EventPatch,
    EventDelete,
    EventMove,
    EventQuickAdd,
    EventInstances,
    Watch,
    StopChannel,
    SettingsList,
    SettingGet,
    FreeBusy,
    ColorsGet,
}

impl RemoteOp {
    pub fn units(self) -> u32 {
        match self {
            RemoteOp::CalendarList
            | RemoteOp::CalendarGet
            | RemoteOp::EventsList
            | RemoteOp::EventGet
            | RemoteOp::EventInstances
            | RemoteOp::SettingsList
            | RemoteOp::SettingGet
            | RemoteOp::FreeBusy
            | RemoteOp::ColorsGet
            | RemoteOp::StopChannel => 1,
            RemoteOp::EventInsert
            | RemoteOp::EventUpdate
            | RemoteOp::EventPatch
            | RemoteOp::EventDelete
            | RemoteOp::EventMove
            | RemoteOp::EventQuickAdd
            | RemoteOp::Watch => 2,
        }
    }
}

/// The remote calendar system, one method per protocol operation.
///
/// Implementations convert their wire formats into the neutral types
/// above and classify failures into the `CalmirError` taxonomy (most
/// importantly 410 → `SyncTokenExpired`). They perform no quota
/// accounting themselves; callers go through the executor.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_calendars(
        &self,
        token: &AccessToken,
        page_token: Option<&str>,
    ) -> CalmirResult<CalendarListPage>;

    async fn get_calendar(
        &self,
        token: &AccessToken,
        calendar_id: &str,
    ) -> CalmirResult<RemoteCalendar>;

    async fn list_events(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        query: &EventQuery,
    ) -> CalmirResult<EventsPage>;

    async fn get_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
    ) -> CalmirResult<RemoteEvent>;

    async fn insert_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> CalmirResult<RemoteEvent>;

    /// Full replacement of an event.
    async fn update_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> CalmirResult<RemoteEvent>;

    /// Partial update; only fields present in the payload change.
    async fn patch_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> CalmirResult<RemoteEvent>;

    async fn delete_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
    ) -> CalmirResult<()>;

    async fn move_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        destination_calendar_id: &str,
    ) -> CalmirResult<RemoteEvent>;

    /// Create an event from a natural-language description.
    async fn quick_add(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        text: &str,
    ) -> CalmirResult<RemoteEvent>;

    /// Expanded instances of a recurring event.
    async fn instances(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        page_token: Option<&str>,
    ) -> CalmirResult<EventsPage>;

    async fn watch_events(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        request: &WatchRequest,
    ) -> CalmirResult<WatchChannel>;

    async fn stop_channel(
        &self,
        token: &AccessToken,
        channel_id: &str,
        resource_id: &str,
    ) -> CalmirResult<()>;

    async fn list_settings(&self, token: &AccessToken) -> CalmirResult<Vec<RemoteSetting>>;

    async fn get_setting(
        &self,
        token: &AccessToken,
        setting_id: &str,
    ) -> CalmirResult<RemoteSetting>;

    async fn free_busy(
        &self,
        token: &AccessToken,
        request: &FreeBusyRequest,
    ) -> CalmirResult<FreeBusyResponse>;

    async fn colors(&self, token: &AccessToken) -> CalmirResult<Colors>;
}
