use calfocus::components::calendar::{CalendarSource, Provider};
use calfocus::components::microsoft_calendar::{MicrosoftCalendarHandle, PkceChallenge, TokenManager};
use calfocus::components::store::{keys, StoreActor, StoreHandle};
use calfocus::config::{Config, Endpoints};
use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;

const PREFER_UTC: &str = "outlook.timezone=\"UTC\"";

fn config_for(server: &MockServer) -> Arc<RwLock<Config>> {
    Arc::new(RwLock::new(Config {
        microsoft_client_id: Some("app-id".to_string()),
        store_url: "memory://".to_string(),
        endpoints: Endpoints {
            microsoft_graph_base: server.base_url(),
            microsoft_login_base: server.base_url(),
            ..Endpoints::default()
        },
        ..Config::default()
    }))
}

async fn store_with_token(access_token: &str, expires_in: i64) -> StoreHandle {
    let store = StoreActor::spawn("memory://").unwrap();
    let token = json!({
        "access_token": access_token,
        "refresh_token": "refresh-1",
        "expires_at": Utc::now().timestamp() + expires_in,
    });
    store.save_token(keys::MICROSOFT_CALENDAR_TOKEN, &token).await.unwrap();
    store
}

fn window() -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(),
    )
}

fn graph_event(id: &str, start: &str, end: &str, show_as: &str) -> serde_json::Value {
    json!({
        "id": id,
        "subject": format!("Event {}", id),
        "isAllDay": false,
        "isCancelled": false,
        "showAs": show_as,
        "start": { "dateTime": start, "timeZone": "UTC" },
        "end": { "dateTime": end, "timeZone": "UTC" }
    })
}

async fn mock_calendars(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/me/calendars");
            then.status(200).json_body(json!({
                "value": [
                    { "id": "cal-default", "name": "Calendar", "isDefaultCalendar": true, "hexColor": "" },
                    { "id": "cal-birthdays", "name": "Birthdays", "isDefaultCalendar": false, "hexColor": "#ff0000" }
                ]
            }));
        })
        .await
}

#[tokio::test]
async fn follows_next_links_on_the_default_calendar() {
    let server = MockServer::start_async().await;
    let calendars = mock_calendars(&server).await;
    let first_page = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/me/calendars/cal-default/calendarView")
                .header("Authorization", "Bearer valid")
                .header("Prefer", PREFER_UTC)
                .query_param("startDateTime", "2024-05-01T00:00:00Z")
                .query_param("endDateTime", "2024-05-02T00:00:00Z")
                .query_param("$top", "100");
            then.status(200).json_body(json!({
                "value": [
                    graph_event("m1", "2024-05-01T10:00:00.0000000", "2024-05-01T10:30:00.0000000", "busy")
                ],
                "@odata.nextLink": server.url("/page-2")
            }));
        })
        .await;
    let second_page = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/page-2")
                .header("Authorization", "Bearer valid")
                .header("Prefer", PREFER_UTC);
            then.status(200).json_body(json!({
                "value": [
                    graph_event("m2", "2024-05-01T08:00:00.0000000", "2024-05-01T09:00:00.0000000", "free"),
                    graph_event("m3", "2024-05-01T12:00:00.0000000", "2024-05-01T13:00:00.0000000", "tentative")
                ]
            }));
        })
        .await;

    let store = store_with_token("valid", 3600).await;
    let handle = MicrosoftCalendarHandle::new(config_for(&server), store);
    let (start, end) = window();

    let batch = handle.events_between(start, end).await.unwrap();
    let events = batch.events;

    calendars.assert_async().await;
    first_page.assert_async().await;
    second_page.assert_async().await;

    assert_eq!(handle.provider(), Provider::Microsoft);
    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["m2", "m1", "m3"]);
    assert!(!events[0].busy);
    assert!(events[1].busy);
    assert_eq!(events[1].start, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
    assert!(events.iter().all(|e| e.calendar_id == "cal-default"));
    assert!(batch.skipped.is_empty());
}

#[tokio::test]
async fn configured_ids_skip_the_calendar_lookup() {
    let server = MockServer::start_async().await;
    let calendars = mock_calendars(&server).await;
    let view = server
        .mock_async(|when, then| {
            when.method(GET).path("/me/calendars/cal-team/calendarView");
            then.status(200).json_body(json!({ "value": [] }));
        })
        .await;

    let config = config_for(&server);
    config.write().await.microsoft_calendar_ids = vec!["cal-team".to_string()];
    let store = store_with_token("valid", 3600).await;
    let handle = MicrosoftCalendarHandle::new(config, store);
    let (start, end) = window();

    assert!(handle.events_between(start, end).await.unwrap().events.is_empty());
    view.assert_async().await;
    calendars.assert_hits_async(0).await;
}

#[tokio::test]
async fn failing_calendar_is_reported_as_skipped() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/me/calendars/cal-team/calendarView");
            then.status(200).json_body(json!({
                "value": [
                    graph_event("t1", "2024-05-01T10:00:00.0000000", "2024-05-01T11:00:00.0000000", "busy")
                ]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/me/calendars/cal-gone/calendarView");
            then.status(503);
        })
        .await;

    let config = config_for(&server);
    config.write().await.microsoft_calendar_ids = vec!["cal-team".to_string(), "cal-gone".to_string()];
    let store = store_with_token("valid", 3600).await;
    let handle = MicrosoftCalendarHandle::new(config, store);
    let (start, end) = window();

    let batch = handle.events_between(start, end).await.unwrap();

    assert_eq!(batch.events.len(), 1);
    assert_eq!(batch.skipped, vec!["cal-gone"]);
    assert!(!batch.is_complete());
}

#[tokio::test]
async fn lists_calendars() {
    let server = MockServer::start_async().await;
    mock_calendars(&server).await;

    let store = store_with_token("valid", 3600).await;
    let handle = MicrosoftCalendarHandle::new(config_for(&server), store);

    let calendars = handle.list_calendars().await.unwrap();

    assert_eq!(calendars.len(), 2);
    assert!(calendars[0].primary);
    assert_eq!(calendars[0].color, None);
    assert_eq!(calendars[1].name, "Birthdays");
}

#[tokio::test]
async fn rejected_token_is_refreshed_once() {
    let server = MockServer::start_async().await;
    let rejected = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/me/calendars")
                .header("Authorization", "Bearer stale");
            then.status(401);
        })
        .await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/common/oauth2/v2.0/token")
                .body_contains("grant_type=refresh_token")
                .body_contains("client_id=app-id");
            then.status(200).json_body(json!({
                "access_token": "renewed",
                "refresh_token": "refresh-2",
                "expires_in": 3599
            }));
        })
        .await;
    let accepted = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/me/calendars")
                .header("Authorization", "Bearer renewed");
            then.status(200).json_body(json!({ "value": [] }));
        })
        .await;

    let store = store_with_token("stale", 3600).await;
    let handle = MicrosoftCalendarHandle::new(config_for(&server), store.clone());

    assert!(handle.list_calendars().await.unwrap().is_empty());

    rejected.assert_hits_async(1).await;
    token.assert_hits_async(1).await;
    accepted.assert_hits_async(1).await;

    // Rotated refresh tokens replace the stored one
    let saved = store.get_token(keys::MICROSOFT_CALENDAR_TOKEN).await.unwrap().unwrap();
    assert_eq!(saved["refresh_token"], "refresh-2");
}

#[tokio::test]
async fn expired_consent_is_unauthorized() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/common/oauth2/v2.0/token");
            then.status(400).json_body(json!({ "error": "invalid_grant" }));
        })
        .await;

    let store = store_with_token("old", -10).await;
    let handle = MicrosoftCalendarHandle::new(config_for(&server), store);
    let (start, end) = window();

    let err = handle.events_between(start, end).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn code_exchange_sends_the_verifier() {
    let server = MockServer::start_async().await;
    let pkce = PkceChallenge::from_verifier("v".repeat(64));
    let verifier_param = format!("code_verifier={}", pkce.verifier);
    let exchange = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/common/oauth2/v2.0/token")
                .body_contains("grant_type=authorization_code")
                .body_contains("code=auth-code")
                .body_contains(verifier_param.as_str());
            then.status(200).json_body(json!({
                "access_token": "first",
                "refresh_token": "refresh-1",
                "expires_in": 3599
            }));
        })
        .await;

    let store = StoreActor::spawn("memory://").unwrap();
    let tokens = TokenManager::new(config_for(&server), store.clone());

    let url = tokens.authorization_url("state-1", &pkce).await.unwrap();
    assert!(url.starts_with(&server.url("/common/oauth2/v2.0/authorize")));
    assert!(url.contains(&format!("code_challenge={}", pkce.challenge)));
    assert!(url.contains("code_challenge_method=S256"));

    tokens.exchange_code("auth-code", &pkce.verifier).await.unwrap();
    exchange.assert_async().await;

    let saved = store.get_token(keys::MICROSOFT_CALENDAR_TOKEN).await.unwrap().unwrap();
    assert_eq!(saved["access_token"], "first");
}
