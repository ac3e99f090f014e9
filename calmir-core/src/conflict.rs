//! Scheduling conflict detection.
//!
//! Pure computation over a proposed time window and a set of candidate
//! mirrored events. Results are advisory; the default blocking policy
//! lives in [`blocks_by_default`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{MAX_CONFLICTS, SAME_TIME_THRESHOLD_MINUTES};
use crate::event::{Event, EventStatus};

/// Severity ordering is derived: `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Starts coincide within the same-time threshold.
    SameTime,
    /// True time overlap.
    Overlap,
    /// No overlap, but within the buffer of each other.
    BackToBack,
}

/// One detected collision with an existing event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub event_id: Uuid,
    pub remote_event_id: String,
    pub calendar_id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
}

/// A proposed `[start, end)` window to check candidates against.
#[derive(Debug, Clone)]
pub struct ConflictQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Adjacency buffer in minutes; 0 disables back-to-back detection.
    pub buffer_minutes: i64,
    /// Event to ignore, e.g. the one being rescheduled.
    pub exclude_event_id: Option<Uuid>,
    /// Restrict candidates to one calendar when set.
    pub calendar_id: Option<String>,
}

/// Scan `candidates` for collisions with the query window.
///
/// Cancelled, soft-deleted and excluded events are skipped. Results are
/// sorted by severity (high first) then start time, capped at
/// `MAX_CONFLICTS`.
pub fn detect_conflicts(query: &ConflictQuery, candidates: &[Event]) -> Vec<Conflict> {
    let buffer = Duration::minutes(query.buffer_minutes.max(0));
    let same_time = Duration::minutes(SAME_TIME_THRESHOLD_MINUTES);

    let mut conflicts: Vec<Conflict> = candidates
        .iter()
        .filter(|event| !event.is_deleted() && event.status != EventStatus::Cancelled)
        .filter(|event| query.exclude_event_id != Some(event.id))
        .filter(|event| {
            query
                .calendar_id
                .as_ref()
                .is_none_or(|cal| *cal == event.calendar_id)
        })
        .filter_map(|event| {
            let overlaps = event.start < query.end && query.start < event.end;
            let (kind, severity) = if overlaps {
                let delta = (event.start - query.start).abs();
                if delta <= same_time {
                    (ConflictKind::SameTime, ConflictSeverity::High)
                } else {
                    (ConflictKind::Overlap, ConflictSeverity::High)
                }
            } else {
                // Buffered adjacency: expand the candidate by the
                // buffer and re-test.
                let near =
                    event.start - buffer < query.end && query.start < event.end + buffer;
                if buffer > Duration::zero() && near {
                    (ConflictKind::BackToBack, ConflictSeverity::Medium)
                } else {
                    return None;
                }
            };

            Some(Conflict {
                event_id: event.id,
                remote_event_id: event.remote_event_id.clone(),
                calendar_id: event.calendar_id.clone(),
                summary: event.summary.clone(),
                start: event.start,
                end: event.end,
                kind,
                severity,
            })
        })
        .collect();

    conflicts.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.start.cmp(&b.start))
    });
    conflicts.truncate(MAX_CONFLICTS);
    conflicts
}

/// Default policy: only `high` severity conflicts block an action.
/// Lower severities are advisory.
pub fn blocks_by_default(conflicts: &[Conflict]) -> bool {
    conflicts
        .iter()
        .any(|c| c.severity == ConflictSeverity::High)
}
