//! Converting Google payloads into the provider-neutral types.

use calmir_core::error::{CalmirError, CalmirResult};
use calmir_core::event::{EventStatus, EventVisibility};
use calmir_core::remote::protocol::{AccessRole, EventTime, RemoteCalendar, RemoteEvent};

use super::{none_if_empty, GoogleCalendarListEntry, GoogleEvent, GoogleEventTime};

pub fn status_from_google(status: &str) -> EventStatus {
    match status {
        "tentative" => EventStatus::Tentative,
        "cancelled" => EventStatus::Cancelled,
        _ => EventStatus::Confirmed,
    }
}

fn visibility_from_google(visibility: &str) -> EventVisibility {
    match visibility {
        "public" => EventVisibility::Public,
        "private" | "confidential" => EventVisibility::Private,
        _ => EventVisibility::Default,
    }
}

pub fn access_role_from_google(role: &str) -> CalmirResult<AccessRole> {
    match role {
        "owner" => Ok(AccessRole::Owner),
        "writer" => Ok(AccessRole::Writer),
        "reader" => Ok(AccessRole::Reader),
        "freeBusyReader" => Ok(AccessRole::FreeBusyReader),
        other => Err(CalmirError::Serialization(format!(
            "unknown access role '{other}'"
        ))),
    }
}

fn time_from_google(time: &GoogleEventTime) -> Option<EventTime> {
    if let Some(date_time) = time.date_time {
        Some(EventTime::DateTime {
            utc: date_time,
            timezone: time.time_zone.clone(),
        })
    } else {
        time.date.map(EventTime::Date)
    }
}

/// Map one listed event. Cancelled delta stubs come through with only
/// id and status; live events carry their full shape.
pub fn event_from_google(event: GoogleEvent) -> CalmirResult<RemoteEvent> {
    if event.id.is_empty() {
        return Err(CalmirError::Serialization(
            "event without an id in listing".to_string(),
        ));
    }

    let start = event.start.as_ref().and_then(time_from_google);
    let end = event.end.as_ref().and_then(time_from_google);
    let status = status_from_google(&event.status);

    if status != EventStatus::Cancelled && (start.is_none() || end.is_none()) {
        return Err(CalmirError::Serialization(format!(
            "live event '{}' is missing start or end",
            event.id
        )));
    }

    Ok(RemoteEvent {
        id: event.id,
        status,
        summary: if event.summary.is_empty() {
            "(No title)".to_string()
        } else {
            event.summary
        },
        description: none_if_empty(event.description),
        location: none_if_empty(event.location),
        start,
        end,
        visibility: visibility_from_google(&event.visibility),
        attendees: event.attendees,
        organizer: event.organizer,
        recurrence: event.recurrence,
        conference: event.conference_data,
        updated: event.updated,
    })
}

pub fn calendar_from_google(entry: GoogleCalendarListEntry) -> CalmirResult<RemoteCalendar> {
    if entry.id.is_empty() {
        return Err(CalmirError::Serialization(
            "calendar without an id in listing".to_string(),
        ));
    }

    Ok(RemoteCalendar {
        access_role: access_role_from_google(&entry.access_role)?,
        id: entry.id,
        summary: if entry.summary.is_empty() {
            "(unnamed)".to_string()
        } else {
            entry.summary
        },
        description: none_if_empty(entry.description),
        timezone: none_if_empty(entry.time_zone),
        color_id: none_if_empty(entry.color_id),
        primary: entry.primary,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    #[test]
    fn test_timed_event_keeps_instant_and_zone() {
        let event = GoogleEvent {
            id: "evt-1".to_string(),
            status: "confirmed".to_string(),
            summary: "Standup".to_string(),
            start: Some(GoogleEventTime {
                date_time: Some(Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap()),
                time_zone: Some("Europe/Stockholm".to_string()),
                ..GoogleEventTime::default()
            }),
            end: Some(GoogleEventTime {
                date_time: Some(Utc.with_ymd_and_hms(2025, 6, 2, 15, 0, 0).unwrap()),
                time_zone: Some("Europe/Stockholm".to_string()),
                ..GoogleEventTime::default()
            }),
            ..GoogleEvent::default()
        };

        let remote = event_from_google(event).unwrap();
        match remote.start.unwrap() {
            EventTime::DateTime { utc, timezone } => {
                assert_eq!(utc, Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap());
                assert_eq!(timezone.as_deref(), Some("Europe/Stockholm"));
            }
            other => panic!("Expected DateTime, got {:?}", other),
        }
    }

    #[test]
    fn test_all_day_event_maps_to_dates() {
        let event = GoogleEvent {
            id: "evt-1".to_string(),
            status: "confirmed".to_string(),
            summary: "Holiday".to_string(),
            start: Some(GoogleEventTime {
                date: Some(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap()),
                ..GoogleEventTime::default()
            }),
            end: Some(GoogleEventTime {
                date: Some(NaiveDate::from_ymd_opt(2025, 7, 5).unwrap()),
                ..GoogleEventTime::default()
            }),
            ..GoogleEvent::default()
        };

        let remote = event_from_google(event).unwrap();
        assert_eq!(
            remote.start.unwrap(),
            EventTime::Date(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap())
        );
        assert_eq!(
            remote.end.unwrap(),
            EventTime::Date(NaiveDate::from_ymd_opt(2025, 7, 5).unwrap())
        );
    }

    #[test]
    fn test_cancelled_stub_is_accepted_without_times() {
        let event = GoogleEvent {
            id: "evt-1".to_string(),
            status: "cancelled".to_string(),
            ..GoogleEvent::default()
        };

        let remote = event_from_google(event).unwrap();
        assert_eq!(remote.status, EventStatus::Cancelled);
        assert!(remote.start.is_none());
    }

    #[test]
    fn test_live_event_without_times_is_an_error() {
        let event = GoogleEvent {
            id: "evt-1".to_string(),
            status: "confirmed".to_string(),
            ..GoogleEvent::default()
        };
        assert!(event_from_google(event).is_err());
    }

    #[test]
    fn test_untitled_event_gets_a_placeholder() {
        let event = GoogleEvent {
            id: "evt-1".to_string(),
            status: "cancelled".to_string(),
            ..GoogleEvent::default()
        };
        assert_eq!(event_from_google(event).unwrap().summary, "(No title)");
    }

    #[test]
    fn test_access_roles() {
        assert_eq!(access_role_from_google("owner").unwrap(), AccessRole::Owner);
        assert_eq!(
            access_role_from_google("freeBusyReader").unwrap(),
            AccessRole::FreeBusyReader
        );
        assert!(access_role_from_google("superuser").is_err());
    }
}
