//! Hand-built test doubles: a scriptable fake remote calendar, a
//! recording job queue and audit sink, and a harness wiring them into
//! an engine over the in-memory store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use calmir_core::approval::EventDraft;
use calmir_core::config::{ApprovalConfig, SyncConfig, WebhookConfig};
use calmir_core::error::{CalmirError, CalmirResult};
use calmir_core::event::{EventStatus, EventVisibility};
use calmir_core::remote::protocol::{
    AccessRole, BusyInterval, CalendarApi, CalendarListPage, Colors, EventPayload, EventQuery,
    EventTime, EventsPage, FreeBusyRequest, FreeBusyResponse, RemoteCalendar, RemoteEvent,
    RemoteSetting, WatchChannel, WatchRequest,
};
use calmir_core::remote::AccessToken;
use chrono::{TimeZone, Utc};

use crate::approval::ApprovalService;
use crate::audit::{AuditRecord, AuditSink};
use crate::credentials::CredentialProvider;
use crate::executor::{RemoteExecutor, RetryPolicy};
use crate::limiter::{QuotaLimits, RateLimiter};
use crate::scheduler::{JobQueue, JobRequest, Scheduler};
use crate::store::memory::MemoryStore;
use crate::sync::{NullIndexSink, SyncEngine};
use crate::webhook::WebhookManager;

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// A live remote event with fixed default times.
pub fn remote_event(id: &str, summary: &str) -> RemoteEvent {
    remote_event_at(id, summary, (2025, 6, 2, 9, 0), (2025, 6, 2, 10, 0))
}

pub fn remote_event_at(
    id: &str,
    summary: &str,
    start: (i32, u32, u32, u32, u32),
    end: (i32, u32, u32, u32, u32),
) -> RemoteEvent {
    RemoteEvent {
        id: id.to_string(),
        status: EventStatus::Confirmed,
        summary: summary.to_string(),
        description: None,
        location: None,
        start: Some(EventTime::DateTime {
            utc: utc(start.0, start.1, start.2, start.3, start.4),
            timezone: None,
        }),
        end: Some(EventTime::DateTime {
            utc: utc(end.0, end.1, end.2, end.3, end.4),
            timezone: None,
        }),
        visibility: EventVisibility::Default,
        attendees: None,
        organizer: None,
        recurrence: None,
        conference: None,
        updated: None,
    }
}

pub fn draft_at(
    summary: &str,
    start: (i32, u32, u32, u32, u32),
    end: (i32, u32, u32, u32, u32),
) -> EventDraft {
    EventDraft {
        summary: summary.to_string(),
        description: None,
        location: None,
        start: EventTime::DateTime {
            utc: utc(start.0, start.1, start.2, start.3, start.4),
            timezone: None,
        },
        end: EventTime::DateTime {
            utc: utc(end.0, end.1, end.2, end.3, end.4),
            timezone: None,
        },
        visibility: EventVisibility::Default,
        attendees: None,
        recurrence: None,
        conference: None,
    }
}

/// Scriptable in-memory stand-in for the remote calendar system.
#[derive(Default)]
pub struct FakeApi {
    calendars: Mutex<Vec<RemoteCalendar>>,
    events: Mutex<HashMap<String, Vec<RemoteEvent>>>,
    deltas: Mutex<HashMap<String, Vec<RemoteEvent>>>,
    token_versions: Mutex<HashMap<String, u32>>,
    page_size: AtomicUsize,

    fail_events: Mutex<HashMap<String, u16>>,
    fail_insert: Mutex<Option<u16>>,
    fail_watch_users: Mutex<HashSet<String>>,
    fail_stop: AtomicBool,

    list_calls: Mutex<HashMap<String, u32>>,
    tokens_issued: AtomicU32,
    delete_count: AtomicU32,
    stop_count: AtomicU32,
    insert_seq: AtomicU32,
}

impl FakeApi {
    pub fn new() -> FakeApi {
        FakeApi::default()
    }

    pub fn add_calendar(&self, id: &str, selected: bool) {
        // Primary calendars start selected in the mirror.
        self.calendars.lock().unwrap().push(RemoteCalendar {
            id: id.to_string(),
            summary: format!("Calendar {id}"),
            description: None,
            timezone: Some("UTC".to_string()),
            color_id: None,
            access_role: AccessRole::Owner,
            primary: selected,
        });
    }

    pub fn add_event(&self, calendar_id: &str, event: RemoteEvent) {
        self.events
            .lock()
            .unwrap()
            .entry(calendar_id.to_string())
            .or_default()
            .push(event);
    }

    pub fn cancel_event(&self, calendar_id: &str, event_id: &str) {
        if let Some(events) = self.events.lock().unwrap().get_mut(calendar_id) {
            for event in events.iter_mut().filter(|e| e.id == event_id) {
                event.status = EventStatus::Cancelled;
            }
        }
    }

    /// Queue a delta item and advance the calendar's token version.
    pub fn push_delta(&self, calendar_id: &str, event: RemoteEvent) {
        self.deltas
            .lock()
            .unwrap()
            .entry(calendar_id.to_string())
            .or_default()
            .push(event);
        *self
            .token_versions
            .lock()
            .unwrap()
            .entry(calendar_id.to_string())
            .or_insert(1) += 1;
    }

    pub fn set_page_size(&self, size: usize) {
        self.page_size.store(size, Ordering::SeqCst);
    }

    pub fn fail_events_with(&self, calendar_id: &str, status: u16) {
        self.fail_events
            .lock()
            .unwrap()
            .insert(calendar_id.to_string(), status);
    }

    pub fn fail_insert_with(&self, status: u16) {
        *self.fail_insert.lock().unwrap() = Some(status);
    }

    pub fn fail_watch_for(&self, user_id: &str) {
        self.fail_watch_users
            .lock()
            .unwrap()
            .insert(user_id.to_string());
    }

    pub fn fail_stop_channel(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn event_list_calls(&self, calendar_id: &str) -> u32 {
        self.list_calls
            .lock()
            .unwrap()
            .get(calendar_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn sync_token_requests(&self) -> u32 {
        self.tokens_issued.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_count.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop_count.load(Ordering::SeqCst)
    }

    fn current_token(&self, calendar_id: &str) -> String {
        let mut versions = self.token_versions.lock().unwrap();
        let version = versions.entry(calendar_id.to_string()).or_insert(1);
        format!("sync-{calendar_id}-{version}")
    }

    fn apply_payload(event: &mut RemoteEvent, payload: &EventPayload) {
        if let Some(summary) = &payload.summary {
            event.summary = summary.clone();
        }
        if payload.description.is_some() {
            event.description = payload.description.clone();
        }
        if payload.location.is_some() {
            event.location = payload.location.clone();
        }
        if payload.start.is_some() {
            event.start = payload.start.clone();
        }
        if payload.end.is_some() {
            event.end = payload.end.clone();
        }
        if let Some(visibility) = payload.visibility {
            event.visibility = visibility;
        }
        if payload.attendees.is_some() {
            event.attendees = payload.attendees.clone();
        }
        if payload.recurrence.is_some() {
            event.recurrence = payload.recurrence.clone();
        }
        if payload.conference.is_some() {
            event.conference = payload.conference.clone();
        }
    }
}

#[async_trait]
impl CalendarApi for FakeApi {
    async fn list_calendars(
        &self,
        _token: &AccessToken,
        _page_token: Option<&str>,
    ) -> CalmirResult<CalendarListPage> {
        Ok(CalendarListPage {
            items: self.calendars.lock().unwrap().clone(),
            next_page_token: None,
        })
    }

    async fn get_calendar(
        &self,
        _token: &AccessToken,
        calendar_id: &str,
    ) -> CalmirResult<RemoteCalendar> {
        self.calendars
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == calendar_id)
            .cloned()
            .ok_or_else(|| CalmirError::NotFound(format!("calendar '{calendar_id}'")))
    }

    async fn list_events(
        &self,
        _token: &AccessToken,
        calendar_id: &str,
        query: &EventQuery,
    ) -> CalmirResult<EventsPage> {
        if let Some(status) = self.fail_events.lock().unwrap().get(calendar_id) {
            return Err(CalmirError::from_status(*status, "scripted failure"));
        }
        *self
            .list_calls
            .lock()
            .unwrap()
            .entry(calendar_id.to_string())
            .or_insert(0) += 1;

        if query.sync_token.is_some() {
            // Delta fetch: drain queued changes, hand back the current
            // token.
            let items = self
                .deltas
                .lock()
                .unwrap()
                .remove(calendar_id)
                .unwrap_or_default();
            self.tokens_issued.fetch_add(1, Ordering::SeqCst);
            return Ok(EventsPage {
                items,
                next_page_token: None,
                next_sync_token: Some(self.current_token(calendar_id)),
            });
        }

        // Bulk listing with optional pagination.
        let all = self
            .events
            .lock()
            .unwrap()
            .get(calendar_id)
            .cloned()
            .unwrap_or_default();
        let page_size = match self.page_size.load(Ordering::SeqCst) {
            0 => all.len().max(1),
            n => n,
        };
        let offset: usize = query
            .page_token
            .as_deref()
            .map(|t| t.parse().unwrap_or(0))
            .unwrap_or(0);
        let end = (offset + page_size).min(all.len());
        let items = all[offset.min(all.len())..end].to_vec();
        let next_page_token = (end < all.len()).then(|| end.to_string());
        let next_sync_token = next_page_token.is_none().then(|| {
            self.tokens_issued.fetch_add(1, Ordering::SeqCst);
            self.current_token(calendar_id)
        });

        Ok(EventsPage {
            items,
            next_page_token,
            next_sync_token,
        })
    }

    async fn get_event(
        &self,
        _token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
    ) -> CalmirResult<RemoteEvent> {
        self.events
            .lock()
            .unwrap()
            .get(calendar_id)
            .and_then(|events| events.iter().find(|e| e.id == event_id))
            .cloned()
            .ok_or_else(|| CalmirError::NotFound(format!("event '{event_id}'")))
    }

    async fn insert_event(
        &self,
        _token: &AccessToken,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> CalmirResult<RemoteEvent> {
        if let Some(status) = *self.fail_insert.lock().unwrap() {
            return Err(CalmirError::from_status(status, "scripted insert failure"));
        }

        let id = format!(
            "evt-new-{}",
            self.insert_seq.fetch_add(1, Ordering::SeqCst) + 1
        );
        let mut event = RemoteEvent {
            id,
            status: EventStatus::Confirmed,
            summary: String::new(),
            description: None,
            location: None,
            start: None,
            end: None,
            visibility: EventVisibility::Default,
            attendees: None,
            organizer: None,
            recurrence: None,
            conference: None,
            updated: Some(Utc::now()),
        };
        Self::apply_payload(&mut event, payload);
        if event.start.is_none() || event.end.is_none() {
            return Err(CalmirError::InvalidRequest(
                "insert payload must carry start and end".to_string(),
            ));
        }

        self.add_event(calendar_id, event.clone());
        Ok(event)
    }

    async fn update_event(
        &self,
        _token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> CalmirResult<RemoteEvent> {
        let mut events = self.events.lock().unwrap();
        let event = events
            .get_mut(calendar_id)
            .and_then(|list| list.iter_mut().find(|e| e.id == event_id))
            .ok_or_else(|| CalmirError::NotFound(format!("event '{event_id}'")))?;

        Self::apply_payload(event, payload);
        event.updated = Some(Utc::now());
        Ok(event.clone())
    }

    async fn patch_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
    ) -> CalmirResult<RemoteEvent> {
        self.update_event(token, calendar_id, event_id, payload).await
    }

    async fn delete_event(
        &self,
        _token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
    ) -> CalmirResult<()> {
        self.delete_count.fetch_add(1, Ordering::SeqCst);
        let mut events = self.events.lock().unwrap();
        let list = events
            .get_mut(calendar_id)
            .ok_or_else(|| CalmirError::NotFound(format!("calendar '{calendar_id}'")))?;
        let before = list.len();
        list.retain(|e| e.id != event_id);
        if list.len() == before {
            return Err(CalmirError::NotFound(format!("event '{event_id}'")));
        }
        Ok(())
    }

    async fn move_event(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        event_id: &str,
        destination_calendar_id: &str,
    ) -> CalmirResult<RemoteEvent> {
        let event = self.get_event(token, calendar_id, event_id).await?;
        self.delete_event(token, calendar_id, event_id).await?;
        self.add_event(destination_calendar_id, event.clone());
        Ok(event)
    }

    async fn quick_add(
        &self,
        token: &AccessToken,
        calendar_id: &str,
        text: &str,
    ) -> CalmirResult<RemoteEvent> {
        let payload = EventPayload {
            summary: Some(text.to_string()),
            start: Some(EventTime::DateTime {
                utc: Utc::now(),
                timezone: None,
            }),
            end: Some(EventTime::DateTime {
                utc: Utc::now() + chrono::Duration::hours(1),
                timezone: None,
            }),
            ..EventPayload::default()
        };
        self.insert_event(token, calendar_id, &payload).await
    }

    async fn instances(
        &self,
        _token: &AccessToken,
        _calendar_id: &str,
        _event_id: &str,
        _page_token: Option<&str>,
    ) -> CalmirResult<EventsPage> {
        Ok(EventsPage::default())
    }

    async fn watch_events(
        &self,
        _token: &AccessToken,
        _calendar_id: &str,
        request: &WatchRequest,
    ) -> CalmirResult<WatchChannel> {
        if self.fail_watch_users.lock().unwrap().contains(&request.token) {
            return Err(CalmirError::from_status(500, "scripted watch failure"));
        }
        Ok(WatchChannel {
            channel_id: request.channel_id.clone(),
            resource_id: format!("res-{}", request.token),
            expires_at: request.expiration,
        })
    }

    async fn stop_channel(
        &self,
        _token: &AccessToken,
        _channel_id: &str,
        _resource_id: &str,
    ) -> CalmirResult<()> {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(CalmirError::from_status(500, "scripted stop failure"));
        }
        Ok(())
    }

    async fn list_settings(&self, _token: &AccessToken) -> CalmirResult<Vec<RemoteSetting>> {
        Ok(Vec::new())
    }

    async fn get_setting(
        &self,
        _token: &AccessToken,
        setting_id: &str,
    ) -> CalmirResult<RemoteSetting> {
        Err(CalmirError::NotFound(format!("setting '{setting_id}'")))
    }

    async fn free_busy(
        &self,
        _token: &AccessToken,
        request: &FreeBusyRequest,
    ) -> CalmirResult<FreeBusyResponse> {
        let events = self.events.lock().unwrap();
        let mut response = FreeBusyResponse::default();
        for calendar_id in &request.calendar_ids {
            let busy: Vec<BusyInterval> = events
                .get(calendar_id)
                .map(|list| {
                    list.iter()
                        .filter_map(|e| match (&e.start, &e.end) {
                            (Some(start), Some(end)) => Some(BusyInterval {
                                start: start.to_utc(),
                                end: end.to_utc(),
                            }),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            response.busy.insert(calendar_id.clone(), busy);
        }
        Ok(response)
    }

    async fn colors(&self, _token: &AccessToken) -> CalmirResult<Colors> {
        Ok(Colors::default())
    }
}

/// Records every enqueued job.
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<JobRequest>>,
    removed: Mutex<Vec<String>>,
}

impl RecordingQueue {
    pub fn jobs(&self) -> Vec<JobRequest> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job: JobRequest) -> CalmirResult<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }

    async fn remove_repeating(&self, job_id: &str) -> CalmirResult<()> {
        self.removed.lock().unwrap().push(job_id.to_string());
        Ok(())
    }

    async fn list_repeating(&self) -> CalmirResult<Vec<String>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.repeat_every.is_some())
            .map(|j| j.id.clone())
            .collect())
    }
}

/// Records audit actions in order.
#[derive(Default)]
pub struct RecordingAudit {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAudit {
    pub fn actions(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.action.clone())
            .collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn record(&self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Credential provider that can be flipped into a failing state.
#[derive(Default)]
pub struct ToggleCredentials {
    failing: AtomicBool,
}

impl ToggleCredentials {
    pub fn fail(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialProvider for ToggleCredentials {
    async fn access_token(&self, user_id: &str) -> CalmirResult<AccessToken> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CalmirError::MissingAccessToken(user_id.to_string()));
        }
        Ok(AccessToken::new("test-token"))
    }
}

/// Everything a test needs, wired together.
pub struct EngineHarness {
    pub engine: SyncEngine,
    pub api: Arc<FakeApi>,
    pub store: Arc<MemoryStore>,
    pub queue: Arc<RecordingQueue>,
    pub audit: Arc<RecordingAudit>,
    pub credentials: Arc<ToggleCredentials>,
    pub executor: Arc<RemoteExecutor>,
}

impl EngineHarness {
    pub fn webhook_manager(&self) -> WebhookManager {
        WebhookManager::new(
            self.store.clone(),
            self.api.clone(),
            self.credentials.clone(),
            self.executor.clone(),
            Arc::new(Scheduler::new(self.queue.clone())),
            WebhookConfig::default(),
        )
    }

    pub fn approval_service(&self) -> ApprovalService {
        ApprovalService::new(
            self.store.clone(),
            self.api.clone(),
            self.credentials.clone(),
            self.executor.clone(),
            self.audit.clone(),
            ApprovalConfig::default(),
        )
    }
}

/// Build a harness with a scripted fake remote.
pub fn engine_with(setup: impl FnOnce(&FakeApi)) -> EngineHarness {
    let api = Arc::new(FakeApi::new());
    setup(&api);

    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(RecordingQueue::default());
    let audit = Arc::new(RecordingAudit::default());
    let credentials = Arc::new(ToggleCredentials::default());

    // Generous budgets so tests exercise logic, not throttling.
    let limiter = Arc::new(RateLimiter::new(
        QuotaLimits {
            units_per_second: 1_000,
            units_per_minute: 10_000,
        },
        Duration::from_millis(10),
    ));
    let executor = Arc::new(RemoteExecutor::new(
        limiter,
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        },
        Duration::from_secs(5),
    ));

    let engine = SyncEngine::new(
        store.clone(),
        api.clone(),
        credentials.clone(),
        executor.clone(),
        Arc::new(NullIndexSink),
        SyncConfig::default(),
    );

    EngineHarness {
        engine,
        api,
        store,
        queue,
        audit,
        credentials,
        executor,
    }
}
