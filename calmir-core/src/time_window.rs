//! Time window for bounding event fetches.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LOOKAHEAD_DAYS, DEFAULT_LOOKBACK_DAYS};

/// Half-open `[from, to)` window used to bound event fetches and
/// conflict scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Default for TimeWindow {
    /// Default range: lookback/lookahead days around now.
    fn default() -> Self {
        Self::around_now(DEFAULT_LOOKBACK_DAYS, DEFAULT_LOOKAHEAD_DAYS)
    }
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        TimeWindow { from, to }
    }

    /// Window spanning `lookback_days` behind now to `lookahead_days`
    /// ahead of now.
    pub fn around_now(lookback_days: i64, lookahead_days: i64) -> Self {
        let now = Utc::now();
        TimeWindow {
            from: now - Duration::days(lookback_days),
            to: now + Duration::days(lookahead_days),
        }
    }

    /// Get `from` as an RFC3339 string for remote queries.
    pub fn from_rfc3339(&self) -> String {
        self.from.to_rfc3339()
    }

    /// Get `to` as an RFC3339 string for remote queries.
    pub fn to_rfc3339(&self) -> String {
        self.to.to_rfc3339()
    }

    /// Whether `[start, end)` intersects this window.
    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.to && self.from < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_intersects_is_half_open() {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
        );

        // Touching at the boundary is not an intersection
        assert!(!window.intersects(
            Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        assert!(window.intersects(
            Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 11, 30, 0).unwrap(),
        ));
    }
}
