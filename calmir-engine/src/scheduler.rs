//! Scheduling façade over the external job queue.
//!
//! No scheduling logic lives here: intents (one-shot syncs, recurring
//! sweeps) are translated into [`JobQueue`] calls with per-kind retry,
//! backoff and retention options. Sync jobs get a stable per-user id,
//! which is what provides the at-most-one-sync-per-user guarantee in
//! the queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calmir_core::error::CalmirResult;
use calmir_core::webhook::RawNotification;
use serde::{Deserialize, Serialize};

/// What a queued job should do when it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    FullSync { user_id: String },
    IncrementalSync { user_id: String },
    ProcessNotification { notification: RawNotification },
    RenewWebhookChannel { user_id: String },
    WebhookRenewalSweep,
    ApprovalExpirySweep,
}

/// Backoff applied by the queue between job retry attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobBackoff {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    pub attempts: u32,
    pub backoff: JobBackoff,
    /// Completed jobs kept for inspection.
    pub keep_completed: u32,
    /// Failed jobs kept for inspection.
    pub keep_failed: u32,
}

/// A one-shot or repeating job handed to the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Stable identity; the queue deduplicates on it.
    pub id: String,
    pub kind: JobKind,
    /// Delay before a one-shot job runs.
    pub delay: Option<Duration>,
    /// Cadence of a repeating job; `None` for one-shot.
    pub repeat_every: Option<Duration>,
    pub options: JobOptions,
}

/// The external job-queue runtime.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: JobRequest) -> CalmirResult<()>;
    async fn remove_repeating(&self, job_id: &str) -> CalmirResult<()>;
    async fn list_repeating(&self) -> CalmirResult<Vec<String>>;
}

pub struct Scheduler {
    queue: Arc<dyn JobQueue>,
}

fn sync_options() -> JobOptions {
    JobOptions {
        attempts: 3,
        backoff: JobBackoff::Exponential { base_ms: 5_000 },
        keep_completed: 20,
        keep_failed: 50,
    }
}

fn sweep_options() -> JobOptions {
    JobOptions {
        attempts: 1,
        backoff: JobBackoff::Fixed { delay_ms: 60_000 },
        keep_completed: 5,
        keep_failed: 20,
    }
}

impl Scheduler {
    pub fn new(queue: Arc<dyn JobQueue>) -> Scheduler {
        Scheduler { queue }
    }

    pub async fn schedule_full_sync(&self, user_id: &str) -> CalmirResult<()> {
        self.queue
            .enqueue(JobRequest {
                id: format!("full-sync:{user_id}"),
                kind: JobKind::FullSync {
                    user_id: user_id.to_string(),
                },
                delay: None,
                repeat_every: None,
                options: sync_options(),
            })
            .await
    }

    pub async fn schedule_incremental_sync(
        &self,
        user_id: &str,
        delay: Option<Duration>,
    ) -> CalmirResult<()> {
        self.queue
            .enqueue(JobRequest {
                id: format!("incremental-sync:{user_id}"),
                kind: JobKind::IncrementalSync {
                    user_id: user_id.to_string(),
                },
                delay,
                repeat_every: None,
                options: sync_options(),
            })
            .await
    }

    /// Hand an inbound notification to the queue for asynchronous
    /// processing.
    pub async fn schedule_notification_processing(
        &self,
        notification: RawNotification,
    ) -> CalmirResult<()> {
        let channel = notification.channel_id.clone().unwrap_or_default();
        self.queue
            .enqueue(JobRequest {
                id: format!("webhook:{channel}"),
                kind: JobKind::ProcessNotification { notification },
                delay: None,
                repeat_every: None,
                options: JobOptions {
                    attempts: 2,
                    backoff: JobBackoff::Fixed { delay_ms: 1_000 },
                    keep_completed: 10,
                    keep_failed: 50,
                },
            })
            .await
    }

    pub async fn schedule_webhook_renewal(&self, user_id: &str) -> CalmirResult<()> {
        self.queue
            .enqueue(JobRequest {
                id: format!("webhook-renew:{user_id}"),
                kind: JobKind::RenewWebhookChannel {
                    user_id: user_id.to_string(),
                },
                delay: None,
                repeat_every: None,
                options: sync_options(),
            })
            .await
    }

    /// Recurring per-user incremental sync.
    pub async fn ensure_recurring_incremental(
        &self,
        user_id: &str,
        every: Duration,
    ) -> CalmirResult<()> {
        self.queue
            .enqueue(JobRequest {
                id: format!("incremental-sync:{user_id}"),
                kind: JobKind::IncrementalSync {
                    user_id: user_id.to_string(),
                },
                delay: None,
                repeat_every: Some(every),
                options: sync_options(),
            })
            .await
    }

    pub async fn remove_recurring_incremental(&self, user_id: &str) -> CalmirResult<()> {
        self.queue
            .remove_repeating(&format!("incremental-sync:{user_id}"))
            .await
    }

    /// Global sweep re-registering webhook channels close to expiry.
    pub async fn ensure_webhook_renewal_sweep(&self, every: Duration) -> CalmirResult<()> {
        self.queue
            .enqueue(JobRequest {
                id: "webhook-renewal-sweep".to_string(),
                kind: JobKind::WebhookRenewalSweep,
                delay: None,
                repeat_every: Some(every),
                options: sweep_options(),
            })
            .await
    }

    /// Global sweep expiring overdue pending approvals.
    pub async fn ensure_approval_expiry_sweep(&self, every: Duration) -> CalmirResult<()> {
        self.queue
            .enqueue(JobRequest {
                id: "approval-expiry-sweep".to_string(),
                kind: JobKind::ApprovalExpirySweep,
                delay: None,
                repeat_every: Some(every),
                options: sweep_options(),
            })
            .await
    }

    pub async fn repeating_jobs(&self) -> CalmirResult<Vec<String>> {
        self.queue.list_repeating().await
    }
}
