//! Wire types for the Calendar v3 REST API and conversion to/from the
//! provider-neutral protocol types.
//!
//! Google leaves absent string fields out or empty, so the wire
//! structs default everything and the converters treat empty strings
//! as missing.

mod from_google;
mod to_google;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use from_google::{
    access_role_from_google, calendar_from_google, event_from_google, status_from_google,
};
pub use to_google::{payload_to_google, time_to_google};

/// Start/end of an event as Google sends it: `date` for all-day
/// events, `date_time` (+ optional `time_zone`) for timed ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleEvent {
    pub id: String,
    pub status: String,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: Option<GoogleEventTime>,
    pub end: Option<GoogleEventTime>,
    pub visibility: String,
    pub attendees: Option<serde_json::Value>,
    pub organizer: Option<serde_json::Value>,
    pub recurrence: Option<serde_json::Value>,
    pub conference_data: Option<serde_json::Value>,
    pub updated: Option<DateTime<Utc>>,
}

/// One page of an events listing or delta fetch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleEvents {
    pub items: Vec<GoogleEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleCalendarListEntry {
    pub id: String,
    pub summary: String,
    pub description: String,
    pub time_zone: String,
    pub color_id: String,
    pub access_role: String,
    pub primary: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleCalendarList {
    pub items: Vec<GoogleCalendarListEntry>,
    pub next_page_token: Option<String>,
}

/// Mutation payload; `None` fields are left out of the request body.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<GoogleEventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<GoogleEventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conference_data: Option<serde_json::Value>,
}

/// Watch request body for `events.watch`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleChannelRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub address: String,
    pub token: String,
    /// Epoch milliseconds.
    pub expiration: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleChannel {
    pub id: String,
    pub resource_id: String,
    /// Epoch milliseconds as a decimal string.
    pub expiration: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleStopRequest {
    pub id: String,
    pub resource_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleSetting {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    pub items: Vec<GoogleSetting>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleFreeBusyRequest {
    pub time_min: String,
    pub time_max: String,
    pub items: Vec<GoogleFreeBusyItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleFreeBusyItem {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleFreeBusyResponse {
    pub calendars: std::collections::BTreeMap<String, GoogleFreeBusyCalendar>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleFreeBusyCalendar {
    pub busy: Vec<GoogleBusyInterval>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleBusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleColors {
    pub event: std::collections::BTreeMap<String, GoogleColorDefinition>,
    pub calendar: std::collections::BTreeMap<String, GoogleColorDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleColorDefinition {
    pub background: String,
    pub foreground: String,
}

/// Error envelope Google wraps failures in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleErrorBody {
    pub error: GoogleErrorDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleErrorDetail {
    pub code: u16,
    pub message: String,
}

pub(crate) fn none_if_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
