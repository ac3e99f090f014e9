//! Converting neutral mutation payloads into Google request bodies.

use calmir_core::event::EventVisibility;
use calmir_core::remote::protocol::{EventPayload, EventTime};

use super::{GoogleEventPayload, GoogleEventTime};

pub fn time_to_google(time: &EventTime) -> GoogleEventTime {
    match time {
        EventTime::DateTime { utc, timezone } => GoogleEventTime {
            date: None,
            date_time: Some(*utc),
            time_zone: timezone.clone(),
        },
        EventTime::Date(date) => GoogleEventTime {
            date: Some(*date),
            date_time: None,
            time_zone: None,
        },
    }
}

fn visibility_to_google(visibility: EventVisibility) -> Option<String> {
    match visibility {
        EventVisibility::Default => None,
        EventVisibility::Public => Some("public".to_string()),
        EventVisibility::Private => Some("private".to_string()),
    }
}

pub fn payload_to_google(payload: &EventPayload) -> GoogleEventPayload {
    GoogleEventPayload {
        summary: payload.summary.clone(),
        description: payload.description.clone(),
        location: payload.location.clone(),
        start: payload.start.as_ref().map(time_to_google),
        end: payload.end.as_ref().map(time_to_google),
        visibility: payload.visibility.and_then(visibility_to_google),
        attendees: payload.attendees.clone(),
        recurrence: payload.recurrence.clone(),
        conference_data: payload.conference.clone(),
    }
}
