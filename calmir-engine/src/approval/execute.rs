//! Execution of approved mutations.
//!
//! Dispatch is an exhaustive match over the action sum type. Each
//! variant re-validates the approval, resolves a credential, performs
//! the remote call through the executor, and mirrors the result into
//! the local store. Whatever goes wrong, the approval ends in
//! `executed` or `failed` — never stuck in `approved`.

use calmir_core::approval::{
    ActionType, Approval, ApprovalStatus, EventDraft, EventPatch, ProposedAction, RsvpResponse,
};
use calmir_core::error::{CalmirError, CalmirResult};
use calmir_core::event::Event;
use calmir_core::remote::protocol::{EventPayload, RemoteEvent, RemoteOp};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::approval::ApprovalService;
use crate::store::{ApprovalStore, EventStore};

pub(crate) async fn run(
    service: &ApprovalService,
    mut approval: Approval,
) -> CalmirResult<Approval> {
    if approval.status != ApprovalStatus::Approved {
        return Err(CalmirError::InvalidRequest(format!(
            "approval '{}' is not approved",
            approval.id
        )));
    }

    let action = approval.action.clone();
    let result = match &action {
        ProposedAction::Create { draft } => execute_create(service, &approval, draft).await,
        ProposedAction::Update { event_id, patch } => {
            execute_update(service, &approval, *event_id, patch).await
        }
        ProposedAction::Delete { event_id } => {
            execute_delete(service, &approval, *event_id).await
        }
        ProposedAction::Respond { event_id, response } => {
            execute_respond(service, &approval, *event_id, *response).await
        }
    };

    match result {
        Ok(local_event_id) => {
            approval.status = ApprovalStatus::Executed;
            approval.result_event_id = Some(local_event_id);
            approval.error = None;
            approval.updated_at = Utc::now();
            service.store.save_approval(&approval).await?;
            service.audit(&approval, "approval.executed", true).await;
            info!(
                user_id = %approval.user_id,
                approval_id = %approval.id,
                event_id = %local_event_id,
                "approved mutation executed"
            );
        }
        Err(err) => {
            approval.status = ApprovalStatus::Failed;
            approval.error = Some(err.to_string());
            approval.updated_at = Utc::now();
            service.store.save_approval(&approval).await?;
            service
                .audit(&approval, "approval.execution_failed", false)
                .await;
            warn!(
                user_id = %approval.user_id,
                approval_id = %approval.id,
                error = %err,
                "approved mutation failed"
            );
        }
    }

    Ok(approval)
}

/// Belt check shared by the variant executors: the approval must carry
/// the action kind the executor was dispatched for.
fn expect_kind(approval: &Approval, expected: ActionType) -> CalmirResult<()> {
    let actual = approval.action.kind();
    if actual != expected {
        return Err(CalmirError::WrongActionType {
            approval_id: approval.id.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

async fn execute_create(
    service: &ApprovalService,
    approval: &Approval,
    draft: &EventDraft,
) -> CalmirResult<Uuid> {
    expect_kind(approval, ActionType::Create)?;

    let user_id = approval.user_id.as_str();
    let calendar_id = approval.calendar_id.as_str();
    let token = service.credentials.access_token(user_id).await?;
    let payload = draft.to_payload();

    let created = service
        .executor
        .run(user_id, RemoteOp::EventInsert, 0, || async {
            service.api.insert_event(&token, calendar_id, &payload).await
        })
        .await?;

    let (_, event) = service
        .store
        .upsert_event(user_id, calendar_id, &created)
        .await?;
    Ok(event.id)
}

async fn execute_update(
    service: &ApprovalService,
    approval: &Approval,
    event_id: Uuid,
    patch: &EventPatch,
) -> CalmirResult<Uuid> {
    expect_kind(approval, ActionType::Update)?;

    let user_id = approval.user_id.as_str();
    let event = live_event(service, user_id, event_id).await?;
    let calendar_id = event.calendar_id.as_str();
    let remote_event_id = event.remote_event_id.as_str();
    let token = service.credentials.access_token(user_id).await?;

    // Full update replaces the remote event, so the current remote
    // state is fetched and the patch merged onto it. Both the read and
    // the write are charged together up front.
    let updated = service
        .executor
        .run(
            user_id,
            RemoteOp::EventUpdate,
            RemoteOp::EventGet.units(),
            || async {
                let current = service
                    .api
                    .get_event(&token, calendar_id, remote_event_id)
                    .await?;
                let payload = merged_payload(&current, patch);
                service
                    .api
                    .update_event(&token, calendar_id, remote_event_id, &payload)
                    .await
            },
        )
        .await?;

    let (_, event) = service
        .store
        .upsert_event(user_id, calendar_id, &updated)
        .await?;
    Ok(event.id)
}

async fn execute_delete(
    service: &ApprovalService,
    approval: &Approval,
    event_id: Uuid,
) -> CalmirResult<Uuid> {
    expect_kind(approval, ActionType::Delete)?;

    let user_id = approval.user_id.as_str();
    let event = service
        .store
        .find_event(user_id, event_id)
        .await?
        .ok_or_else(|| CalmirError::NotFound(format!("event '{event_id}'")))?;

    // Already gone locally: deletion is idempotent.
    if event.is_deleted() {
        return Ok(event.id);
    }
    if event.remote_event_id.is_empty() {
        return Err(CalmirError::NotRemoteEvent(event.id.to_string()));
    }

    let calendar_id = event.calendar_id.as_str();
    let remote_event_id = event.remote_event_id.as_str();
    let token = service.credentials.access_token(user_id).await?;

    service
        .executor
        .run(user_id, RemoteOp::EventDelete, 0, || async {
            match service
                .api
                .delete_event(&token, calendar_id, remote_event_id)
                .await
            {
                // Already deleted on the remote side counts as done.
                Err(CalmirError::NotFound(_)) | Err(CalmirError::SyncTokenExpired(_)) => Ok(()),
                other => other,
            }
        })
        .await?;

    service
        .store
        .soft_delete_event(user_id, remote_event_id)
        .await?;
    Ok(event.id)
}

async fn execute_respond(
    service: &ApprovalService,
    approval: &Approval,
    event_id: Uuid,
    response: RsvpResponse,
) -> CalmirResult<Uuid> {
    expect_kind(approval, ActionType::Respond)?;

    let user_id = approval.user_id.as_str();
    let event = live_event(service, user_id, event_id).await?;
    let calendar_id = event.calendar_id.as_str();
    let remote_event_id = event.remote_event_id.as_str();
    let token = service.credentials.access_token(user_id).await?;

    // The attendee list must be read before it can be patched; the
    // compound cost is secured as one unit total.
    let updated = service
        .executor
        .run(
            user_id,
            RemoteOp::EventPatch,
            RemoteOp::EventGet.units(),
            || async {
                let current = service
                    .api
                    .get_event(&token, calendar_id, remote_event_id)
                    .await?;
                let attendees = responded_attendees(&current, response)?;
                let payload = EventPayload {
                    attendees: Some(attendees),
                    ..EventPayload::default()
                };
                service
                    .api
                    .patch_event(&token, calendar_id, remote_event_id, &payload)
                    .await
            },
        )
        .await?;

    let (_, event) = service
        .store
        .upsert_event(user_id, calendar_id, &updated)
        .await?;
    Ok(event.id)
}

async fn live_event(
    service: &ApprovalService,
    user_id: &str,
    event_id: Uuid,
) -> CalmirResult<Event> {
    let event = service
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

/// Merge a patch onto the current remote state for a full update.
fn merged_payload(current: &RemoteEvent, patch: &EventPatch) -> EventPayload {
    EventPayload {
        summary: patch
            .summary
            .clone()
            .or_else(|| Some(current.summary.clone())),
        description: patch.description.clone().or_else(|| current.description.clone()),
        location: patch.location.clone().or_else(|| current.location.clone()),
        start: patch.start.clone().or_else(|| current.start.clone()),
        end: patch.end.clone().or_else(|| current.end.clone()),
        visibility: patch.visibility.or(Some(current.visibility)),
        attendees: patch.attendees.clone().or_else(|| current.attendees.clone()),
        recurrence: current.recurrence.clone(),
        conference: current.conference.clone(),
    }
}

/// Set the authenticated attendee's response status in the remote
/// attendee payload.
fn responded_attendees(
    current: &RemoteEvent,
    response: RsvpResponse,
) -> CalmirResult<serde_json::Value> {
    let Some(serde_json::Value::Array(mut items)) = current.attendees.clone() else {
        return Err(CalmirError::InvalidRequest(format!(
            "event '{}' has no attendees",
            current.id
        )));
    };

    let mut found = false;
    for item in &mut items {
        let is_self = item.get("self").and_then(|v| v.as_bool()).unwrap_or(false);
        if is_self {
            item["responseStatus"] = json!(response.as_remote_str());
            found = true;
        }
    }

    if !found {
        return Err(CalmirError::InvalidRequest(format!(
            "authenticated user is not an attendee of event '{}'",
            current.id
        )));
    }
    Ok(serde_json::Value::Array(items))
}
