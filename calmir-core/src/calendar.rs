//! The locally mirrored calendar row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::protocol::{AccessRole, RemoteCalendar};

/// A mirrored calendar. `is_selected` and `is_hidden` are user
/// decisions and survive metadata refreshes from the remote list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub user_id: String,
    /// Remote calendar id, unique per user.
    pub remote_calendar_id: String,

    pub summary: String,
    pub description: Option<String>,
    pub timezone: Option<String>,
    pub color_id: Option<String>,
    pub access_role: AccessRole,
    pub is_primary: bool,

    /// User opt-in to event sync for this calendar.
    pub is_selected: bool,
    pub is_hidden: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Calendar {
    /// Build a fresh row from the remote list. Primary calendars start
    /// selected; everything else waits for the user to opt in.
    pub fn from_remote(user_id: &str, remote: &RemoteCalendar) -> Calendar {
        let now = Utc::now();
        Calendar {
            user_id: user_id.to_string(),
            remote_calendar_id: remote.id.clone(),
            summary: remote.summary.clone(),
            description: remote.description.clone(),
            timezone: remote.timezone.clone(),
            color_id: remote.color_id.clone(),
            access_role: remote.access_role,
            is_primary: remote.primary,
            is_selected: remote.primary,
            is_hidden: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh metadata from the remote list without touching the
    /// user's `is_selected` / `is_hidden` decisions.
    pub fn apply_remote(&mut self, remote: &RemoteCalendar) {
        self.summary = remote.summary.clone();
        self.description = remote.description.clone();
        self.timezone = remote.timezone.clone();
        self.color_id = remote.color_id.clone();
        self.access_role = remote.access_role;
        self.is_primary = remote.primary;
        self.updated_at = Utc::now();
    }

    pub fn can_write(&self) -> bool {
        self.access_role.can_write()
    }
}
