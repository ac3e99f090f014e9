//! Full sync: checkpointed, resumable bulk rebuild of the mirror.

use calmir_core::error::CalmirResult;
use calmir_core::remote::protocol::{EventQuery, RemoteOp};
use calmir_core::sync_state::{FullSyncCheckpoint, SyncStatus};
use calmir_core::time_window::TimeWindow;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{CalendarStore, SyncStateStore};
use crate::sync::{
    apply_remote_item, queue_for_indexing, record_change, FullSyncPhase, ProgressFn,
    ResourceError, SyncEngine, SyncProgress, SyncReport,
};

/// Overrides for one full sync run.
#[derive(Debug, Clone, Default)]
pub struct FullSyncOptions {
    /// Event window; defaults to the configured lookback/lookahead.
    pub window: Option<TimeWindow>,
}

fn emit(progress: &Option<ProgressFn>, phase: FullSyncPhase, calendars: u32, events: u64) {
    if let Some(callback) = progress {
        callback(SyncProgress::Full {
            phase,
            calendars_processed: calendars,
            events_processed: events,
        });
    }
}

pub(crate) async fn run(
    engine: &SyncEngine,
    user_id: &str,
    options: FullSyncOptions,
    progress: Option<ProgressFn>,
) -> CalmirResult<SyncReport> {
    let started = Instant::now();
    let mut report = SyncReport::default();

    let mut state = engine.store.get_or_create_sync_state(user_id).await?;
    let resume_from = state.checkpoint.clone();
    state.set_status(SyncStatus::FullSync);
    if state.checkpoint.is_none() {
        state.checkpoint = Some(FullSyncCheckpoint {
            calendar_id: String::new(),
            page_token: None,
            events_processed: 0,
            started_at: Utc::now(),
        });
    }
    engine.store.save_sync_state(&state).await?;

    let token = match engine.credentials.access_token(user_id).await {
        Ok(token) => token,
        Err(err) => {
            state.record_error(err.to_string());
            engine.store.save_sync_state(&state).await?;
            return Err(err);
        }
    };

    // Phase 1: refresh the calendar list, preserving user selections.
    let mut page_token: Option<String> = None;
    loop {
        let page = match engine
            .executor
            .run(user_id, RemoteOp::CalendarList, 0, || async {
                engine
                    .api
                    .list_calendars(&token, page_token.as_deref())
                    .await
            })
            .await
        {
            Ok(page) => page,
            Err(err) => {
                state.record_error(err.to_string());
                engine.store.save_sync_state(&state).await?;
                return Err(err);
            }
        };

        for remote in &page.items {
            engine.store.upsert_calendar(user_id, remote).await?;
        }

        emit(&progress, FullSyncPhase::Calendars, 0, 0);
        match page.next_page_token {
            Some(next) => page_token = Some(next),
            None => break,
        }
    }

    // Phase 2: walk events for every selected calendar.
    let window = options
        .window
        .unwrap_or_else(|| {
            TimeWindow::around_now(engine.config.lookback_days, engine.config.lookahead_days)
        });
    let calendars = engine.store.selected_calendars(user_id).await?;

    // Resume: skip calendars completed before the checkpointed one and
    // restart that calendar at its saved page.
    let resume_index = resume_from.as_ref().and_then(|cp| {
        calendars
            .iter()
            .position(|c| c.remote_calendar_id == cp.calendar_id)
    });
    let mut events_processed: u64 = match (&resume_index, &resume_from) {
        (Some(_), Some(cp)) => cp.events_processed,
        _ => 0,
    };
    let skip = resume_index.unwrap_or(0);
    if skip > 0 {
        info!(
            user_id,
            skipped = skip,
            "resuming full sync from checkpoint"
        );
        report.calendars_processed = skip as u32;
    }

    let mut touched: Vec<Uuid> = Vec::new();

    for (position, calendar) in calendars.iter().enumerate().skip(skip) {
        let calendar_id = calendar.remote_calendar_id.clone();
        let mut page_token: Option<String> = match (&resume_index, &resume_from) {
            (Some(i), Some(cp)) if *i == position => cp.page_token.clone(),
            _ => None,
        };
        let mut final_sync_token: Option<String> = None;
        let mut failed = false;

        for _page in 0..engine.config.max_event_pages {
            let query = EventQuery {
                window: Some(window),
                page_token: page_token.clone(),
                sync_token: None,
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
                Err(err) => {
                    warn!(
                        user_id,
                        calendar_id = %calendar_id,
                        error = %err,
                        "calendar failed during full sync, continuing"
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
                events_processed += 1;
            }

            // Checkpoint after every completed page so an interrupted
            // run resumes here instead of restarting.
            state.checkpoint = Some(FullSyncCheckpoint {
                calendar_id: calendar_id.clone(),
                page_token: page.next_page_token.clone(),
                events_processed,
                started_at: resume_from
                    .as_ref()
                    .map(|cp| cp.started_at)
                    .unwrap_or_else(Utc::now),
            });
            engine.store.save_sync_state(&state).await?;

            emit(
                &progress,
                FullSyncPhase::Events,
                report.calendars_processed,
                events_processed,
            );

            if page.next_sync_token.is_some() {
                final_sync_token = page.next_sync_token;
            }
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        if !failed {
            report.calendars_processed += 1;
            // The final page's continuation token seeds the next
            // incremental sync for this calendar.
            if let Some(sync_token) = final_sync_token {
                state.store_sync_token(&calendar_id, sync_token);
            }
        }

        let queued =
            queue_for_indexing(&engine.index, user_id, &mut touched, engine.config.index_batch_size)
                .await;
        state.events_pending_index += queued;
        engine.store.save_sync_state(&state).await?;
    }

    // Checkpoint is cleared only on full success; a failed run keeps it
    // for resumption.
    let now = Utc::now();
    state.checkpoint = None;
    state.last_sync_at = Some(now);
    state.last_full_sync_at = Some(now);
    if report.errors.is_empty() {
        state.set_status(SyncStatus::Idle);
        state.clear_error();
    } else {
        state.record_error(format!(
            "{} calendar(s) failed during full sync",
            report.errors.len()
        ));
    }
    engine.store.save_sync_state(&state).await?;

    report.duration = started.elapsed();
    emit(
        &progress,
        FullSyncPhase::Complete,
        report.calendars_processed,
        events_processed,
    );
    info!(
        user_id,
        calendars = report.calendars_processed,
        added = report.events_added,
        updated = report.events_updated,
        deleted = report.events_deleted,
        errors = report.errors.len(),
        "full sync finished"
    );

    Ok(report)
}
