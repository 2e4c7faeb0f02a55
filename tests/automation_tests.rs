use async_trait::async_trait;
use calfocus::components::automation::{Automation, AutomationSettings, Transition};
use calfocus::components::calendar::{
    CalendarEvent, CalendarListEntry, CalendarSource, EventBatch, Provider,
};
use calfocus::components::chat_status::ChatStatusClient;
use calfocus::components::focus::FocusController;
use calfocus::components::store::{StoreActor, StoreHandle};
use calfocus::error::{focus_error, google_calendar_error, SyncResult};
use chrono::{DateTime, Duration, TimeZone, Utc};
use httpmock::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Calendar source serving a fixed list of events
struct MockSource {
    provider: Provider,
    events: Vec<CalendarEvent>,
    skipped: Vec<String>,
    fail: AtomicBool,
}

impl MockSource {
    fn serving(provider: Provider, events: Vec<CalendarEvent>) -> Arc<dyn CalendarSource> {
        Arc::new(Self {
            provider,
            events,
            skipped: Vec::new(),
            fail: AtomicBool::new(false),
        })
    }

    fn failing(provider: Provider) -> Arc<dyn CalendarSource> {
        Arc::new(Self {
            provider,
            events: Vec::new(),
            skipped: Vec::new(),
            fail: AtomicBool::new(true),
        })
    }

    /// Answers, but one of its calendars did not
    fn partial(provider: Provider, events: Vec<CalendarEvent>, skipped: &str) -> Arc<dyn CalendarSource> {
        Arc::new(Self {
            provider,
            events,
            skipped: vec![skipped.to_string()],
            fail: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl CalendarSource for MockSource {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn list_calendars(&self) -> SyncResult<Vec<CalendarListEntry>> {
        Ok(Vec::new())
    }

    async fn events_between(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> SyncResult<EventBatch> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(google_calendar_error("HTTP 503"));
        }
        Ok(EventBatch {
            events: self.events.clone(),
            skipped: self.skipped.clone(),
        })
    }
}

/// Focus controller recording every toggle
#[derive(Default)]
struct RecordingFocus {
    calls: Mutex<Vec<bool>>,
    fail: AtomicBool,
}

impl RecordingFocus {
    fn calls(&self) -> Vec<bool> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FocusController for RecordingFocus {
    async fn set_focus(&self, on: bool) -> SyncResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(focus_error("shortcuts exited with 1"));
        }
        self.calls.lock().unwrap().push(on);
        Ok(())
    }

    async fn list_shortcuts(&self) -> SyncResult<Vec<String>> {
        Ok(vec!["Focus On".to_string(), "Focus Off".to_string()])
    }
}

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn meeting(id: &str, start_min: i64, end_min: i64) -> CalendarEvent {
    CalendarEvent {
        id: id.to_string(),
        calendar_id: "primary".to_string(),
        provider: Provider::Google,
        summary: Some(format!("Meeting {}", id)),
        start: at(start_min),
        end: at(end_min),
        all_day: false,
        busy: true,
    }
}

fn memory_store() -> StoreHandle {
    StoreActor::spawn("memory://").unwrap()
}

fn automation(
    sources: Vec<Arc<dyn CalendarSource>>,
    focus: Arc<RecordingFocus>,
    store: StoreHandle,
) -> Automation {
    Automation::new(sources, focus, None, store, AutomationSettings::default())
}

#[tokio::test]
async fn toggles_only_on_edges() {
    let source = MockSource::serving(Provider::Google, vec![meeting("a", 0, 30)]);
    let focus = Arc::new(RecordingFocus::default());
    let automation = automation(vec![source], Arc::clone(&focus), memory_store());

    let before = automation.tick(at(-5)).await.unwrap();
    assert!(before.transition.is_none());
    assert!(focus.calls().is_empty());

    let start = automation.tick(at(0)).await.unwrap();
    assert!(matches!(start.transition, Some(Transition::Enter(_))));
    assert_eq!(focus.calls(), vec![true]);

    // Same state again: nothing is re-issued
    let during = automation.tick(at(10)).await.unwrap();
    assert!(during.transition.is_none());
    assert_eq!(focus.calls(), vec![true]);

    // The end instant is outside the window
    let end = automation.tick(at(30)).await.unwrap();
    assert_eq!(end.transition, Some(Transition::Leave));
    assert_eq!(focus.calls(), vec![true, false]);
}

#[tokio::test]
async fn back_to_back_meetings_keep_focus_on() {
    let source = MockSource::serving(
        Provider::Google,
        vec![meeting("a", 0, 30), meeting("b", 30, 60)],
    );
    let focus = Arc::new(RecordingFocus::default());
    let automation = automation(vec![source], Arc::clone(&focus), memory_store());

    automation.tick(at(5)).await.unwrap();
    let switch = automation.tick(at(35)).await.unwrap();

    assert!(matches!(switch.transition, Some(Transition::Extend(ref e)) if e.id == "b"));
    assert_eq!(focus.calls(), vec![true]);
    assert_eq!(automation.state().await.event_id.as_deref(), Some("b"));
}

#[tokio::test]
async fn failed_toggle_is_retried_next_tick() {
    let source = MockSource::serving(Provider::Google, vec![meeting("a", 0, 30)]);
    let focus = Arc::new(RecordingFocus::default());
    focus.fail.store(true, Ordering::SeqCst);
    let automation = automation(vec![source], Arc::clone(&focus), memory_store());

    assert!(automation.tick(at(1)).await.is_err());
    assert!(!automation.state().await.in_meeting);

    focus.fail.store(false, Ordering::SeqCst);
    let retry = automation.tick(at(2)).await.unwrap();
    assert!(matches!(retry.transition, Some(Transition::Enter(_))));
    assert_eq!(focus.calls(), vec![true]);
}

#[tokio::test]
async fn a_failing_source_does_not_block_the_others() {
    let broken = MockSource::failing(Provider::Google);
    let working = MockSource::serving(Provider::Microsoft, vec![meeting("m", 0, 60)]);
    let focus = Arc::new(RecordingFocus::default());
    let automation = automation(vec![broken, working], Arc::clone(&focus), memory_store());

    let outcome = automation.tick(at(15)).await.unwrap();
    assert!(!outcome.complete);
    assert_eq!(outcome.current.unwrap().id, "m");
    assert_eq!(focus.calls(), vec![true]);
}

#[tokio::test]
async fn transient_failure_holds_focus_through_a_restart() {
    let store = memory_store();
    let google = MockSource::serving(Provider::Google, vec![meeting("a", 0, 60)]);

    let first_focus = Arc::new(RecordingFocus::default());
    let first = automation(vec![google], Arc::clone(&first_focus), store.clone());
    first.tick(at(5)).await.unwrap();
    assert_eq!(first_focus.calls(), vec![true]);

    // Back up with Google answering 503 and an empty Microsoft calendar
    let second_focus = Arc::new(RecordingFocus::default());
    let second = automation(
        vec![
            MockSource::failing(Provider::Google),
            MockSource::serving(Provider::Microsoft, Vec::new()),
        ],
        Arc::clone(&second_focus),
        store,
    );
    second.load_state().await;

    let outcome = second.tick(at(10)).await.unwrap();
    assert!(outcome.transition.is_none());
    assert!(!outcome.complete);
    assert!(second_focus.calls().is_empty());
    assert!(second.state().await.in_meeting);
}

#[tokio::test]
async fn skipped_calendar_holds_focus_until_it_answers() {
    let store = memory_store();
    let focus = Arc::new(RecordingFocus::default());

    let healthy = automation(
        vec![MockSource::serving(Provider::Google, vec![meeting("a", 0, 60)])],
        Arc::clone(&focus),
        store.clone(),
    );
    healthy.tick(at(5)).await.unwrap();

    // The meeting's calendar stops answering while the rest of the source works
    let degraded = automation(
        vec![MockSource::partial(Provider::Google, vec![meeting("b", 10, 20)], "primary")],
        Arc::clone(&focus),
        store.clone(),
    );
    degraded.load_state().await;

    let held = degraded.tick(at(15)).await.unwrap();
    assert_eq!(held.current.unwrap().id, "b");
    assert!(held.transition.is_none());
    assert_eq!(degraded.state().await.event_id.as_deref(), Some("a"));

    let still_held = degraded.tick(at(30)).await.unwrap();
    assert!(still_held.transition.is_none());
    assert_eq!(focus.calls(), vec![true]);

    // A complete answer lets the meeting end
    let recovered = automation(
        vec![MockSource::serving(Provider::Google, Vec::new())],
        Arc::clone(&focus),
        store,
    );
    recovered.load_state().await;
    let outcome = recovered.tick(at(30)).await.unwrap();
    assert!(outcome.complete);
    assert_eq!(outcome.transition, Some(Transition::Leave));
    assert_eq!(focus.calls(), vec![true, false]);
}

#[tokio::test]
async fn partial_answers_can_still_start_a_meeting() {
    let source = MockSource::partial(Provider::Google, vec![meeting("a", 0, 30)], "team");
    let focus = Arc::new(RecordingFocus::default());
    let automation = automation(vec![source], Arc::clone(&focus), memory_store());

    let outcome = automation.tick(at(1)).await.unwrap();
    assert!(matches!(outcome.transition, Some(Transition::Enter(_))));
    assert_eq!(focus.calls(), vec![true]);
}

#[tokio::test]
async fn all_sources_failing_abandons_the_tick() {
    let broken = MockSource::failing(Provider::Google);
    let focus = Arc::new(RecordingFocus::default());
    let automation = automation(vec![broken], Arc::clone(&focus), memory_store());

    assert!(automation.tick(at(10)).await.is_err());
    assert!(focus.calls().is_empty());
}

#[tokio::test]
async fn no_sources_is_an_error() {
    let focus = Arc::new(RecordingFocus::default());
    let automation = automation(Vec::new(), focus, memory_store());
    assert!(automation.fetch_events(at(0)).await.is_err());
}

#[tokio::test]
async fn fetch_names_the_sources_that_failed() {
    let focus = Arc::new(RecordingFocus::default());
    let automation = automation(
        vec![
            MockSource::failing(Provider::Google),
            MockSource::partial(Provider::Microsoft, vec![meeting("m", 0, 30)], "cal-team"),
        ],
        focus,
        memory_store(),
    );

    let batch = automation.fetch_events(at(0)).await.unwrap();
    assert_eq!(batch.events.len(), 1);
    assert_eq!(batch.skipped, vec!["google", "cal-team"]);
}

#[tokio::test]
async fn restored_state_prevents_duplicate_toggle() {
    let store = memory_store();
    let source = MockSource::serving(Provider::Google, vec![meeting("a", 0, 30)]);

    let first_focus = Arc::new(RecordingFocus::default());
    let first = automation(vec![source.clone()], Arc::clone(&first_focus), store.clone());
    first.tick(at(1)).await.unwrap();
    assert_eq!(first_focus.calls(), vec![true]);

    // A restart in the middle of the meeting
    let second_focus = Arc::new(RecordingFocus::default());
    let second = automation(vec![source], Arc::clone(&second_focus), store);
    second.load_state().await;
    assert!(second.state().await.in_meeting);

    let outcome = second.tick(at(5)).await.unwrap();
    assert!(outcome.transition.is_none());
    assert!(second_focus.calls().is_empty());
}

#[tokio::test]
async fn free_and_all_day_events_do_not_trigger() {
    let mut lunch = meeting("lunch", 0, 60);
    lunch.busy = false;
    let mut offsite = meeting("offsite", -600, 900);
    offsite.all_day = true;
    let source = MockSource::serving(Provider::Google, vec![lunch, offsite]);
    let focus = Arc::new(RecordingFocus::default());
    let automation = automation(vec![source], Arc::clone(&focus), memory_store());

    let outcome = automation.tick(at(30)).await.unwrap();
    assert!(outcome.current.is_none());
    assert!(focus.calls().is_empty());
}

#[tokio::test]
async fn chat_status_follows_the_meeting() {
    let server = MockServer::start_async().await;
    let set = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/users.profile.set")
                .header("Authorization", "Bearer xoxp-test")
                .json_body_partial(r#"{ "profile": { "status_text": "In a meeting", "status_emoji": ":calendar:" } }"#);
            then.status(200).json_body(serde_json::json!({ "ok": true }));
        })
        .await;
    let clear = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/users.profile.set")
                .json_body_partial(r#"{ "profile": { "status_text": "" } }"#);
            then.status(200).json_body(serde_json::json!({ "ok": true }));
        })
        .await;

    let source = MockSource::serving(Provider::Google, vec![meeting("a", 0, 30)]);
    let focus = Arc::new(RecordingFocus::default());
    let chat = ChatStatusClient::new(server.base_url(), "xoxp-test");
    let automation = Automation::new(
        vec![source],
        focus.clone(),
        Some(chat),
        memory_store(),
        AutomationSettings::default(),
    );

    automation.tick(at(0)).await.unwrap();
    set.assert_hits_async(1).await;

    automation.tick(at(45)).await.unwrap();
    clear.assert_hits_async(1).await;
    assert_eq!(focus.calls(), vec![true, false]);
}

#[tokio::test]
async fn chat_failure_does_not_undo_focus() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/users.profile.set");
            then.status(200)
                .json_body(serde_json::json!({ "ok": false, "error": "ratelimited" }));
        })
        .await;

    let source = MockSource::serving(Provider::Google, vec![meeting("a", 0, 30)]);
    let focus = Arc::new(RecordingFocus::default());
    let automation = Automation::new(
        vec![source],
        focus.clone(),
        Some(ChatStatusClient::new(server.base_url(), "xoxp-test")),
        memory_store(),
        AutomationSettings::default(),
    );

    let outcome = automation.tick(at(0)).await.unwrap();
    assert!(matches!(outcome.transition, Some(Transition::Enter(_))));
    assert!(automation.state().await.in_meeting);
}
