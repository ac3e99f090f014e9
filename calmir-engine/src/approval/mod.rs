//! The approval workflow: request, decide, execute.
//!
//! Every user-visible mutation becomes a `pending` [`Approval`] first.
//! A human decision moves it to `approved` (optionally executing
//! synchronously), `rejected`, or — via the sweep or lazily on access —
//! `expired`. Execution happens in [`execute`] and always lands the
//! row in `executed` or `failed`, never stuck in `approved`.

pub mod execute;

use std::str::FromStr;
use std::sync::Arc;

use calmir_core::approval::{
    Approval, ApprovalStatus, EventDraft, EventPatch, ProposedAction, RsvpResponse,
};
use calmir_core::config::ApprovalConfig;
use calmir_core::conflict::{detect_conflicts, Conflict, ConflictQuery};
use calmir_core::error::{CalmirError, CalmirResult};
use calmir_core::event::Event;
use calmir_core::remote::protocol::{CalendarApi, EventTime};
use calmir_core::time_window::TimeWindow;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditSink};
use crate::credentials::CredentialProvider;
use crate::executor::RemoteExecutor;
use crate::store::{ApprovalStore, CalendarStore, EventStore, MirrorStore};

/// API-facing result: a success flag and a human-readable message.
/// Internal error detail stays on the approval row and in the audit
/// trail.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    pub approval: Approval,
}

impl ActionOutcome {
    pub fn from_approval(approval: Approval) -> ActionOutcome {
        let (success, message) = match approval.status {
            ApprovalStatus::Pending => (true, "awaiting approval".to_string()),
            ApprovalStatus::Approved => (true, "approved".to_string()),
            ApprovalStatus::Executed => (true, "done".to_string()),
            ApprovalStatus::Rejected => (false, "rejected".to_string()),
            ApprovalStatus::Expired => (false, "request expired".to_string()),
            ApprovalStatus::Failed => {
                (false, "the calendar change could not be applied".to_string())
            }
        };
        ActionOutcome {
            success,
            message,
            approval,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateEventRequest {
    pub calendar_id: String,
    pub draft: EventDraft,
    pub requested_by: String,
    pub check_conflicts: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateEventRequest {
    pub event_id: Uuid,
    pub patch: EventPatch,
    pub requested_by: String,
    pub check_conflicts: bool,
}

#[derive(Debug, Clone)]
pub struct DeleteEventRequest {
    pub event_id: Uuid,
    pub requested_by: String,
}

#[derive(Debug, Clone)]
pub struct RespondEventRequest {
    pub event_id: Uuid,
    pub response: RsvpResponse,
    pub requested_by: String,
}

pub struct ApprovalService {
    pub(crate) store: Arc<dyn MirrorStore>,
    pub(crate) api: Arc<dyn CalendarApi>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) executor: Arc<RemoteExecutor>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) config: ApprovalConfig,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        api: Arc<dyn CalendarApi>,
        credentials: Arc<dyn CredentialProvider>,
        executor: Arc<RemoteExecutor>,
        audit: Arc<dyn AuditSink>,
        config: ApprovalConfig,
    ) -> ApprovalService {
        ApprovalService {
            store,
            api,
            credentials,
            executor,
            audit,
            config,
        }
    }

    // REQUEST OPERATIONS:

    pub async fn request_event_creation(
        &self,
        user_id: &str,
        request: CreateEventRequest,
    ) -> CalmirResult<Approval> {
        validate_draft(&request.draft)?;

        let calendar = self
            .store
            .find_calendar(user_id, &request.calendar_id)
            .await?
            .ok_or_else(|| {
                CalmirError::NotFound(format!("calendar '{}'", request.calendar_id))
            })?;
        if !calendar.can_write() {
            return Err(CalmirError::InsufficientPermission(format!(
                "no write access to calendar '{}'",
                request.calendar_id
            )));
        }

        let conflicts = if request.check_conflicts {
            self.conflicts_for(
                user_id,
                request.draft.start.to_utc(),
                request.draft.end.to_utc(),
                None,
            )
            .await?
        } else {
            Vec::new()
        };

        self.persist_request(
            user_id,
            &request.calendar_id,
            ProposedAction::Create {
                draft: request.draft,
            },
            conflicts,
            &request.requested_by,
        )
        .await
    }

    pub async fn request_event_update(
        &self,
        user_id: &str,
        request: UpdateEventRequest,
    ) -> CalmirResult<Approval> {
        if request.patch.is_empty() {
            return Err(CalmirError::InvalidRequest(
                "update patch contains no changes".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (&request.patch.start, &request.patch.end) {
            validate_times(start, end)?;
        }

        let event = self.owned_remote_event(user_id, request.event_id).await?;

        let conflicts = if request.check_conflicts {
            let start = request
                .patch
                .start
                .as_ref()
                .map(EventTime::to_utc)
                .unwrap_or(event.start);
            let end = request
                .patch
                .end
                .as_ref()
                .map(EventTime::to_utc)
                .unwrap_or(event.end);
            self.conflicts_for(user_id, start, end, Some(event.id)).await?
        } else {
            Vec::new()
        };

        self.persist_request(
            user_id,
            &event.calendar_id,
            ProposedAction::Update {
                event_id: event.id,
                patch: request.patch,
            },
            conflicts,
            &request.requested_by,
        )
        .await
    }

    pub async fn request_event_deletion(
        &self,
        user_id: &str,
        request: DeleteEventRequest,
    ) -> CalmirResult<Approval> {
        let event = self.owned_remote_event(user_id, request.event_id).await?;

        self.persist_request(
            user_id,
            &event.calendar_id,
            ProposedAction::Delete { event_id: event.id },
            Vec::new(),
            &request.requested_by,
        )
        .await
    }

    pub async fn request_event_response(
        &self,
        user_id: &str,
        request: RespondEventRequest,
    ) -> CalmirResult<Approval> {
        let event = self.owned_remote_event(user_id, request.event_id).await?;
        if event.attendees.is_none() {
            return Err(CalmirError::InvalidRequest(format!(
                "event '{}' has no attendees to respond as",
                event.id
            )));
        }

        self.persist_request(
            user_id,
            &event.calendar_id,
            ProposedAction::Respond {
                event_id: event.id,
                response: request.response,
            },
            Vec::new(),
            &request.requested_by,
        )
        .await
    }

    // DECISION OPERATIONS:

    /// Approve a pending request. An already-expired request is
    /// transitioned to `expired` and reported as a failure instead.
    /// With `auto_execute` the mutation runs synchronously and the
    /// returned approval is in its final state.
    pub async fn approve(
        &self,
        user_id: &str,
        approval_id: Uuid,
        decided_by: &str,
        auto_execute: bool,
    ) -> CalmirResult<Approval> {
        let mut approval = self.owned_approval(user_id, approval_id).await?;

        if approval.is_expired(Utc::now()) {
            self.transition(&mut approval, ApprovalStatus::Expired, Some(decided_by))
                .await?;
            self.audit(&approval, "approval.expired", false).await;
            return Err(CalmirError::InvalidRequest(format!(
                "approval '{approval_id}' expired before it was decided"
            )));
        }

        if approval.status != ApprovalStatus::Pending {
            return Err(CalmirError::InvalidRequest(format!(
                "approval '{approval_id}' is not pending"
            )));
        }

        self.transition(&mut approval, ApprovalStatus::Approved, Some(decided_by))
            .await?;
        self.audit(&approval, "approval.approved", true).await;
        info!(user_id, approval_id = %approval.id, "approval granted");

        if auto_execute {
            return self.execute(approval.id).await;
        }
        Ok(approval)
    }

    pub async fn reject(
        &self,
        user_id: &str,
        approval_id: Uuid,
        decided_by: &str,
    ) -> CalmirResult<Approval> {
        self.close_pending(user_id, approval_id, decided_by, "approval.rejected")
            .await
    }

    /// Requester-side withdrawal; same transition as reject.
    pub async fn cancel(
        &self,
        user_id: &str,
        approval_id: Uuid,
        cancelled_by: &str,
    ) -> CalmirResult<Approval> {
        self.close_pending(user_id, approval_id, cancelled_by, "approval.cancelled")
            .await
    }

    /// Sweep transitioning every overdue pending row to `expired`.
    pub async fn expire_all(&self) -> CalmirResult<u64> {
        let overdue = self.store.pending_expired_before(Utc::now()).await?;
        let mut expired = 0;

        for mut approval in overdue {
            self.transition(&mut approval, ApprovalStatus::Expired, None)
                .await?;
            self.audit(&approval, "approval.expired", false).await;
            expired += 1;
        }

        if expired > 0 {
            info!(count = expired, "expired overdue approvals");
        }
        Ok(expired)
    }

    /// Execute an approved mutation against the remote system and
    /// mirror the result. Always lands in `executed` or `failed`.
    pub async fn execute(&self, approval_id: Uuid) -> CalmirResult<Approval> {
        let approval = self
            .store
            .find_approval(approval_id)
            .await?
            .ok_or_else(|| CalmirError::NotFound(format!("approval '{approval_id}'")))?;

        execute::run(self, approval).await
    }

    // INTERNAL:

    async fn close_pending(
        &self,
        user_id: &str,
        approval_id: Uuid,
        decided_by: &str,
        audit_action: &str,
    ) -> CalmirResult<Approval> {
        let mut approval = self.owned_approval(user_id, approval_id).await?;

        if approval.status != ApprovalStatus::Pending {
            return Err(CalmirError::InvalidRequest(format!(
                "approval '{approval_id}' is not pending"
            )));
        }

        self.transition(&mut approval, ApprovalStatus::Rejected, Some(decided_by))
            .await?;
        self.audit(&approval, audit_action, false).await;
        Ok(approval)
    }

    async fn persist_request(
        &self,
        user_id: &str,
        calendar_id: &str,
        action: ProposedAction,
        conflicts: Vec<Conflict>,
        requested_by: &str,
    ) -> CalmirResult<Approval> {
        let approval = Approval::new(
            user_id,
            calendar_id,
            action,
            conflicts,
            requested_by,
            self.config.default_expiry_hours,
        );
        self.store.insert_approval(&approval).await?;
        self.audit(&approval, "approval.requested", true).await;
        info!(
            user_id,
            approval_id = %approval.id,
            action = %approval.action.kind(),
            conflicts = approval.conflicts.len(),
            "mutation request recorded"
        );
        Ok(approval)
    }

    async fn transition(
        &self,
        approval: &mut Approval,
        status: ApprovalStatus,
        decided_by: Option<&str>,
    ) -> CalmirResult<()> {
        approval.status = status;
        approval.decided_at = Some(Utc::now());
        approval.decided_by = decided_by.map(str::to_string);
        approval.updated_at = Utc::now();
        self.store.save_approval(approval).await
    }

    async fn audit(&self, approval: &Approval, action: &str, success: bool) {
        self.audit
            .record(
                AuditRecord::new(&approval.user_id, action, success)
                    .approval(approval.id)
                    .detail(json!({
                        "action_type": approval.action.kind().to_string(),
                        "calendar_id": approval.calendar_id,
                        "status": approval.status,
                    })),
            )
            .await;
    }

    /// The event, verified to belong to the user, be live, and have a
    /// remote counterpart.
    async fn owned_remote_event(&self, user_id: &str, event_id: Uuid) -> CalmirResult<Event> {
        let event = self
            .store
            .find_event(user_id, event_id)
            .await?
            .filter(|e| !e.is_deleted())
            .ok_or_else(|| CalmirError::NotFound(format!("event '{event_id}'")))?;

        if event.remote_event_id.is_empty() {
            return Err(CalmirError::NotRemoteEvent(event.id.to_string()));
        }
        Ok(event)
    }

    async fn owned_approval(&self, user_id: &str, approval_id: Uuid) -> CalmirResult<Approval> {
        self.store
            .find_approval(approval_id)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| CalmirError::NotFound(format!("approval '{approval_id}'")))
    }

    async fn conflicts_for(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> CalmirResult<Vec<Conflict>> {
        let buffer = Duration::minutes(self.config.conflict_buffer_minutes.max(0));
        let scan = TimeWindow::new(start - buffer, end + buffer);
        let candidates = self.store.events_in_window(user_id, None, &scan).await?;

        Ok(detect_conflicts(
            &ConflictQuery {
                start,
                end,
                buffer_minutes: self.config.conflict_buffer_minutes,
                exclude_event_id: exclude,
                calendar_id: None,
            },
            &candidates,
        ))
    }
}

fn validate_draft(draft: &EventDraft) -> CalmirResult<()> {
    if draft.summary.trim().is_empty() {
        return Err(CalmirError::InvalidRequest(
            "event summary must not be empty".to_string(),
        ));
    }
    validate_times(&draft.start, &draft.end)
}

fn validate_times(start: &EventTime, end: &EventTime) -> CalmirResult<()> {
    if end.to_utc() <= start.to_utc() {
        return Err(CalmirError::InvalidRequest(
            "event end must be after its start".to_string(),
        ));
    }
    for time in [start, end] {
        if let Some(zone) = time.timezone() {
            if chrono_tz::Tz::from_str(zone).is_err() {
                return Err(CalmirError::InvalidRequest(format!(
                    "unknown timezone '{zone}'"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use calmir_core::conflict::ConflictSeverity;
    use chrono::TimeZone;

    use super::*;
    use crate::store::{ApprovalStore, EventStore};
    use crate::sync::full::FullSyncOptions;
    use crate::testutil::{draft_at, engine_with, remote_event_at, EngineHarness};

    async fn seeded() -> EngineHarness {
        let harness = engine_with(|api| {
            api.add_calendar("cal-1", true);
            api.add_event(
                "cal-1",
                remote_event_at("evt-1", "Existing meeting", (2025, 6, 2, 10, 0), (2025, 6, 2, 11, 0)),
            );
        });
        harness
            .engine
            .full_sync("user-1", FullSyncOptions::default(), None)
            .await
            .unwrap();
        harness
    }

    fn create_request(start_h: u32, end_h: u32) -> CreateEventRequest {
        CreateEventRequest {
            calendar_id: "cal-1".to_string(),
            draft: draft_at("Proposed", (2025, 6, 2, start_h, 0), (2025, 6, 2, end_h, 0)),
            requested_by: "assistant".to_string(),
            check_conflicts: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_request_attaches_conflict_snapshot() {
        let harness = seeded().await;
        let service = harness.approval_service();

        let approval = service
            .request_event_creation("user-1", create_request(10, 11))
            .await
            .unwrap();

        assert_eq!(approval.status, ApprovalStatus::Pending);
        assert_eq!(approval.conflicts.len(), 1);
        assert_eq!(approval.conflicts[0].severity, ConflictSeverity::High);
        assert_eq!(approval.conflicts[0].remote_event_id, "evt-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_request_validates_draft() {
        let harness = seeded().await;
        let service = harness.approval_service();

        let mut bad_summary = create_request(13, 14);
        bad_summary.draft.summary = "   ".to_string();
        assert!(matches!(
            service
                .request_event_creation("user-1", bad_summary)
                .await
                .unwrap_err(),
            CalmirError::InvalidRequest(_)
        ));

        // End before start
        assert!(service
            .request_event_creation("user-1", create_request(14, 13))
            .await
            .is_err());

        let mut bad_zone = create_request(13, 14);
        bad_zone.draft.start = EventTime::DateTime {
            utc: Utc.with_ymd_and_hms(2025, 6, 2, 13, 0, 0).unwrap(),
            timezone: Some("Mars/Olympus_Mons".to_string()),
        };
        assert!(service
            .request_event_creation("user-1", bad_zone)
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_calendar_is_rejected() {
        let harness = seeded().await;
        let service = harness.approval_service();

        let mut request = create_request(13, 14);
        request.calendar_id = "cal-nope".to_string();
        assert!(matches!(
            service
                .request_event_creation("user-1", request)
                .await
                .unwrap_err(),
            CalmirError::NotFound(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleting_a_local_only_event_fails_before_any_approval() {
        let harness = seeded().await;
        let service = harness.approval_service();

        // A row without a remote counterpart.
        let mut local_only = harness
            .store
            .find_by_remote_id("user-1", "evt-1")
            .await
            .unwrap()
            .unwrap();
        local_only.id = Uuid::new_v4();
        local_only.remote_event_id = String::new();
        harness.store.save_event(&local_only).await.unwrap();

        let err = service
            .request_event_deletion(
                "user-1",
                DeleteEventRequest {
                    event_id: local_only.id,
                    requested_by: "assistant".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CalmirError::NotRemoteEvent(_)));
        let approvals = harness.store.list_approvals("user-1", None).await.unwrap();
        assert!(approvals.is_empty(), "no approval row may be created");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_patch_is_rejected() {
        let harness = seeded().await;
        let service = harness.approval_service();
        let event = harness
            .store
            .find_by_remote_id("user-1", "evt-1")
            .await
            .unwrap()
            .unwrap();

        let err = service
            .request_event_update(
                "user-1",
                UpdateEventRequest {
                    event_id: event.id,
                    patch: EventPatch::default(),
                    requested_by: "assistant".to_string(),
                    check_conflicts: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CalmirError::InvalidRequest(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_approve_requires_pending_and_leaves_status_unchanged() {
        let harness = seeded().await;
        let service = harness.approval_service();

        let approval = service
            .request_event_creation("user-1", create_request(13, 14))
            .await
            .unwrap();
        service
            .reject("user-1", approval.id, "human")
            .await
            .unwrap();

        let err = service
            .approve("user-1", approval.id, "human", false)
            .await
            .unwrap_err();
        assert!(matches!(err, CalmirError::InvalidRequest(_)));

        let stored = harness
            .store
            .find_approval(approval.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ApprovalStatus::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_approving_an_expired_request_expires_it_instead() {
        let harness = seeded().await;
        let service = harness.approval_service();

        let mut approval = service
            .request_event_creation("user-1", create_request(13, 14))
            .await
            .unwrap();
        approval.expires_at = Utc::now() - Duration::hours(1);
        harness.store.save_approval(&approval).await.unwrap();

        let err = service
            .approve("user-1", approval.id, "human", false)
            .await
            .unwrap_err();
        assert!(matches!(err, CalmirError::InvalidRequest(_)));

        let stored = harness
            .store
            .find_approval(approval.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ApprovalStatus::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_requires_pending() {
        let harness = seeded().await;
        let service = harness.approval_service();

        let approval = service
            .request_event_creation("user-1", create_request(13, 14))
            .await
            .unwrap();
        let cancelled = service
            .cancel("user-1", approval.id, "assistant")
            .await
            .unwrap();
        assert_eq!(cancelled.status, ApprovalStatus::Rejected);

        assert!(service
            .cancel("user-1", approval.id, "assistant")
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_all_transitions_only_overdue_pending_rows() {
        let harness = seeded().await;
        let service = harness.approval_service();

        let fresh = service
            .request_event_creation("user-1", create_request(13, 14))
            .await
            .unwrap();
        let mut overdue = service
            .request_event_creation("user-1", create_request(15, 16))
            .await
            .unwrap();
        overdue.expires_at = Utc::now() - Duration::minutes(5);
        harness.store.save_approval(&overdue).await.unwrap();
        let mut done = service
            .request_event_creation("user-1", create_request(17, 18))
            .await
            .unwrap();
        done.status = ApprovalStatus::Executed;
        done.expires_at = Utc::now() - Duration::minutes(5);
        harness.store.save_approval(&done).await.unwrap();

        let expired = service.expire_all().await.unwrap();

        assert_eq!(expired, 1);
        let check = |id: Uuid| {
            let store = harness.store.clone();
            async move { store.find_approval(id).await.unwrap().unwrap().status }
        };
        assert_eq!(check(fresh.id).await, ApprovalStatus::Pending);
        assert_eq!(check(overdue.id).await, ApprovalStatus::Expired);
        assert_eq!(check(done.id).await, ApprovalStatus::Executed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_approvals_are_invisible() {
        let harness = seeded().await;
        let service = harness.approval_service();

        let approval = service
            .request_event_creation("user-1", create_request(13, 14))
            .await
            .unwrap();

        let err = service
            .approve("user-2", approval.id, "human", false)
            .await
            .unwrap_err();
        assert!(matches!(err, CalmirError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_audit_records_every_request_and_decision() {
        let harness = seeded().await;
        let service = harness.approval_service();

        let approval = service
            .request_event_creation("user-1", create_request(13, 14))
            .await
            .unwrap();
        service
            .approve("user-1", approval.id, "human", false)
            .await
            .unwrap();

        let actions = harness.audit.actions();
        assert!(actions.contains(&"approval.requested".to_string()));
        assert!(actions.contains(&"approval.approved".to_string()));
    }
}
