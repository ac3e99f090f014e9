//! Error types for the calmir ecosystem.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in calmir operations.
///
/// Remote-facing variants carry a retryability classification so the
/// call executor can decide whether to back off and try again.
#[derive(Error, Debug)]
pub enum CalmirError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        /// Suggested delay before the caller retries.
        retry_after: Option<Duration>,
    },

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Insufficient permission: {0}")]
    InsufficientPermission(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Sync token expired for calendar '{0}'")]
    SyncTokenExpired(String),

    #[error("Full sync required: {0}")]
    SyncRequired(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event '{0}' has no remote counterpart")]
    NotRemoteEvent(String),

    #[error("No valid access token for user '{0}'")]
    MissingAccessToken(String),

    #[error("Approval '{approval_id}' holds a '{actual}' action, expected '{expected}'")]
    WrongActionType {
        approval_id: String,
        expected: String,
        actual: String,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CalmirError {
    /// Whether the remote call that produced this error may be retried.
    ///
    /// Only transient remote conditions qualify: 429-class throttling,
    /// server-side failures, network problems and timeouts. Everything
    /// else (including other 4xx) is permanent for the attempted call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CalmirError::RateLimited { .. }
                | CalmirError::Network(_)
                | CalmirError::Timeout(_)
                | CalmirError::Server { .. }
        )
    }

    /// Suggested delay before retrying, when the error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CalmirError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classify a remote HTTP status into the error taxonomy.
    ///
    /// 403 is ambiguous at the remote system: it signals both missing
    /// permission and per-user rate limiting, distinguished only by the
    /// error message.
    pub fn from_status(status: u16, message: &str) -> CalmirError {
        let msg = message.to_string();
        match status {
            401 => CalmirError::Unauthorized(msg),
            403 => {
                let lower = message.to_ascii_lowercase();
                if lower.contains("rate limit") || lower.contains("ratelimit") {
                    CalmirError::RateLimited {
                        message: msg,
                        retry_after: None,
                    }
                } else if lower.contains("quota") {
                    CalmirError::QuotaExceeded(msg)
                } else {
                    CalmirError::InsufficientPermission(msg)
                }
            }
            404 => CalmirError::NotFound(msg),
            409 => CalmirError::Conflict(msg),
            410 => CalmirError::SyncTokenExpired(msg),
            429 => CalmirError::RateLimited {
                message: msg,
                retry_after: None,
            },
            500..=599 => CalmirError::Server {
                status,
                message: msg,
            },
            _ => CalmirError::InvalidRequest(msg),
        }
    }
}

impl From<serde_json::Error> for CalmirError {
    fn from(e: serde_json::Error) -> Self {
        CalmirError::Serialization(e.to_string())
    }
}

/// Result type alias for calmir operations.
pub type CalmirResult<T> = Result<T, CalmirError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            CalmirError::from_status(401, "no"),
            CalmirError::Unauthorized(_)
        ));
        assert!(matches!(
            CalmirError::from_status(404, "gone"),
            CalmirError::NotFound(_)
        ));
        assert!(matches!(
            CalmirError::from_status(409, "etag"),
            CalmirError::Conflict(_)
        ));
        assert!(matches!(
            CalmirError::from_status(410, "token"),
            CalmirError::SyncTokenExpired(_)
        ));
        assert!(matches!(
            CalmirError::from_status(429, "slow down"),
            CalmirError::RateLimited { .. }
        ));
        assert!(matches!(
            CalmirError::from_status(503, "oops"),
            CalmirError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn test_403_is_disambiguated_by_message() {
        assert!(matches!(
            CalmirError::from_status(403, "Rate Limit Exceeded"),
            CalmirError::RateLimited { .. }
        ));
        assert!(matches!(
            CalmirError::from_status(403, "Calendar usage quota exceeded"),
            CalmirError::QuotaExceeded(_)
        ));
        assert!(matches!(
            CalmirError::from_status(403, "The user does not have write access"),
            CalmirError::InsufficientPermission(_)
        ));
    }

    #[test]
    fn test_retryability() {
        assert!(CalmirError::from_status(429, "x").is_retryable());
        assert!(CalmirError::from_status(500, "x").is_retryable());
        assert!(CalmirError::Network("reset".into()).is_retryable());
        assert!(CalmirError::Timeout("deadline".into()).is_retryable());

        assert!(!CalmirError::from_status(400, "x").is_retryable());
        assert!(!CalmirError::from_status(404, "x").is_retryable());
        assert!(!CalmirError::from_status(410, "x").is_retryable());
        assert!(!CalmirError::Unauthorized("x".into()).is_retryable());
    }
}
