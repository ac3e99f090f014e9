//! Audit sink contract.
//!
//! Every approval request, decision and execution emits a structured
//! record, success or failure. Delivery is fire-and-forget: a failing
//! sink never affects the operation being audited.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub user_id: String,
    /// What happened, e.g. `approval.requested`, `approval.executed`.
    pub action: String,
    pub approval_id: Option<Uuid>,
    pub success: bool,
    /// Free-form structured context.
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(user_id: &str, action: &str, success: bool) -> AuditRecord {
        AuditRecord {
            user_id: user_id.to_string(),
            action: action.to_string(),
            approval_id: None,
            success,
            detail: serde_json::Value::Null,
            at: Utc::now(),
        }
    }

    pub fn approval(mut self, id: Uuid) -> AuditRecord {
        self.approval_id = Some(id);
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> AuditRecord {
        self.detail = detail;
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Discards every record. Default for tests.
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _record: AuditRecord) {}
}
