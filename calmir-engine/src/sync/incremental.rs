//! Incremental sync: delta fetches from per-calendar continuation
//! tokens.

use calmir_core::error::{CalmirError, CalmirResult};
use calmir_core::remote::protocol::{EventQuery, RemoteOp};
use calmir_core::sync_state::SyncStatus;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{CalendarStore, SyncStateStore};
use crate::sync::{
    apply_remote_item, queue_for_indexing, record_change, IncrementalSyncPhase, ProgressFn,
    ResourceError, SyncEngine, SyncProgress, SyncReport,
};

fn emit(
    progress: &Option<ProgressFn>,
    phase: IncrementalSyncPhase,
    calendars: u32,
    changes: u64,
) {
    if let Some(callback) = progress {
        callback(SyncProgress::Incremental {
            phase,
            calendars_processed: calendars,
            changes_processed: changes,
        });
    }
}

pub(crate) async fn run(
    engine: &SyncEngine,
    user_id: &str,
    progress: Option<ProgressFn>,
) -> CalmirResult<SyncReport> {
    let started = Instant::now();
    let mut report = SyncReport::default();

    let mut state = engine.store.get_or_create_sync_state(user_id).await?;

    // No tokens at all means there is nothing to resume from. This is
    // the distinct fall-back-to-full-sync condition, not a failure.
    if !state.has_sync_tokens() {
        return Err(CalmirError::SyncRequired(format!(
            "user '{user_id}' has no continuation tokens"
        )));
    }

    state.set_status(SyncStatus::IncrementalSync);
    engine.store.save_sync_state(&state).await?;

    let token = match engine.credentials.access_token(user_id).await {
        Ok(token) => token,
        Err(err) => {
            state.record_error(err.to_string());
            engine.store.save_sync_state(&state).await?;
            return Err(err);
        }
    };

    let calendars = engine.store.selected_calendars(user_id).await?;
    let mut changes_processed: u64 = 0;
    let mut touched: Vec<Uuid> = Vec::new();

    for calendar in &calendars {
        let calendar_id = calendar.remote_calendar_id.clone();

        let Some(stored_token) = state.sync_tokens.get(&calendar_id).cloned() else {
            // Selected after the last full sync; it has no delta
            // baseline yet.
            report.errors.push(ResourceError {
                calendar_id: calendar_id.clone(),
                message: "no continuation token; full sync required".to_string(),
            });
            continue;
        };

        emit(
            &progress,
            IncrementalSyncPhase::Fetching,
            report.calendars_processed,
            changes_processed,
        );

        let mut page_token: Option<String> = None;
        let mut new_sync_token: Option<String> = None;
        let mut failed = false;

        loop {
            let query = EventQuery {
                window: None,
                page_token: page_token.clone(),
                // The token goes on the first request only; follow-up
                // pages continue via the page token.
                sync_token: page_token.is_none().then(|| stored_token.clone()),
                show_deleted: true,
                single_events: false,
                max_results: engine.config.page_size,
            };

            let page = match engine
                .executor
                .run(user_id, RemoteOp::EventsList, 0, || async {
                    engine.api.list_events(&token, &calendar_id, &query).await
                })
                .await
            {
                Ok(page) => page,
                Err(CalmirError::SyncTokenExpired(_)) => {
                    // The remote no longer honors this token. Clear it
                    // and hand the decision back to the caller: only a
                    // full rebuild can recover.
                    warn!(
                        user_id,
                        calendar_id = %calendar_id,
                        "continuation token expired, full sync required"
                    );
                    state.clear_sync_token(&calendar_id);
                    state.record_error(format!(
                        "continuation token expired for calendar '{calendar_id}'"
                    ));
                    engine.store.save_sync_state(&state).await?;
                    return Err(CalmirError::SyncRequired(format!(
                        "continuation token expired for calendar '{calendar_id}'"
                    )));
                }
                Err(err) => {
                    // Transient or calendar-local failure: record it
                    // and leave the old token intact so the next run
                    // retries the same delta window.
                    warn!(
                        user_id,
                        calendar_id = %calendar_id,
                        error = %err,
                        "calendar failed during incremental sync, continuing"
                    );
                    report.errors.push(ResourceError {
                        calendar_id: calendar_id.clone(),
                        message: err.to_string(),
                    });
                    failed = true;
                    break;
                }
            };

            for item in &page.items {
                let change =
                    apply_remote_item(&engine.store, user_id, &calendar_id, item).await?;
                record_change(&mut report, &mut touched, change);
                changes_processed += 1;
            }

            emit(
                &progress,
                IncrementalSyncPhase::Processing,
                report.calendars_processed,
                changes_processed,
            );

            if page.next_sync_token.is_some() {
                new_sync_token = page.next_sync_token;
            }
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        if !failed {
            report.calendars_processed += 1;
            if let Some(sync_token) = new_sync_token {
                state.store_sync_token(&calendar_id, sync_token);
            }
        }

        let queued = queue_for_indexing(
            &engine.index,
            user_id,
            &mut touched,
            engine.config.index_batch_size,
        )
        .await;
        state.events_pending_index += queued;
        engine.store.save_sync_state(&state).await?;
    }

    state.last_sync_at = Some(Utc::now());
    if report.errors.is_empty() {
        state.set_status(SyncStatus::Idle);
        state.clear_error();
    } else {
        state.record_error(format!(
            "{} calendar(s) failed during incremental sync",
            report.errors.len()
        ));
    }
    engine.store.save_sync_state(&state).await?;

    report.duration = started.elapsed();
    emit(
        &progress,
        IncrementalSyncPhase::Complete,
        report.calendars_processed,
        changes_processed,
    );
    info!(
        user_id,
        calendars = report.calendars_processed,
        added = report.events_added,
        updated = report.events_updated,
        deleted = report.events_deleted,
        errors = report.errors.len(),
        "incremental sync finished"
    );

    Ok(report)
}
