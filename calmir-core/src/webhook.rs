//! Push-notification wire contract.
//!
//! The HTTP layer hands the engine a [`RawNotification`] assembled from
//! the transport headers. Validation of the four mandatory fields
//! (channel id, resource id, resource state, a recognized state value)
//! happens here, before any processing.

use serde::{Deserialize, Serialize};

use crate::error::{CalmirError, CalmirResult};

/// State of the watched resource as reported by the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Channel handshake; acknowledged without action.
    Sync,
    Exists,
    NotExists,
}

impl ResourceState {
    pub fn parse(s: &str) -> Option<ResourceState> {
        match s {
            "sync" => Some(ResourceState::Sync),
            "exists" => Some(ResourceState::Exists),
            "not_exists" => Some(ResourceState::NotExists),
            _ => None,
        }
    }
}

/// A notification exactly as received from the transport, every field
/// still optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawNotification {
    pub channel_id: Option<String>,
    pub resource_id: Option<String>,
    pub resource_state: Option<String>,
    pub message_number: Option<i64>,
    /// Verification token the channel was registered with.
    pub token: Option<String>,
    pub expiration: Option<String>,
}

/// A notification that passed mandatory-field validation.
#[derive(Debug, Clone)]
pub struct ChannelNotification {
    pub channel_id: String,
    pub resource_id: String,
    pub state: ResourceState,
    pub message_number: Option<i64>,
    pub token: Option<String>,
    pub expiration: Option<String>,
}

impl RawNotification {
    /// Enforce the mandatory fields; an invalid notification is
    /// rejected before any lookup or sync is attempted.
    pub fn validate(self) -> CalmirResult<ChannelNotification> {
        let channel_id = require(self.channel_id, "channel id")?;
        let resource_id = require(self.resource_id, "resource id")?;
        let state_raw = require(self.resource_state, "resource state")?;

        let state = ResourceState::parse(&state_raw).ok_or_else(|| {
            CalmirError::InvalidRequest(format!(
                "unknown resource state '{state_raw}' in notification"
            ))
        })?;

        Ok(ChannelNotification {
            channel_id,
            resource_id,
            state,
            message_number: self.message_number,
            token: self.token,
            expiration: self.expiration,
        })
    }
}

fn require(field: Option<String>, name: &str) -> CalmirResult<String> {
    match field {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CalmirError::InvalidRequest(format!(
            "notification is missing {name}"
        ))),
    }
}
