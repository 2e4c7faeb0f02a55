use super::models::{CalendarListPage, EventsPage};
use super::token::TokenManager;
use crate::components::calendar::token::send_with_refresh;
use crate::components::calendar::{CalendarEvent, CalendarListEntry, EventBatch, Provider};
use crate::components::store::StoreHandle;
use crate::config::Config;
use crate::error::{google_calendar_error, SyncResult};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

/// Upper bound on pages followed per request, protects against a server
/// that keeps handing out page tokens
const MAX_PAGES: usize = 20;

/// The Google Calendar actor that processes messages
pub struct GoogleCalendarActor {
    config: Arc<RwLock<Config>>,
    token_manager: TokenManager,
    client: Client,
    command_rx: mpsc::Receiver<GoogleCalendarCommand>,
    store: StoreHandle,
}

/// Commands that can be sent to the Google Calendar actor
pub enum GoogleCalendarCommand {
    ListCalendars(mpsc::Sender<SyncResult<Vec<CalendarListEntry>>>),
    GetEvents(
        DateTime<Utc>,
        DateTime<Utc>,
        mpsc::Sender<SyncResult<EventBatch>>,
    ),
    Shutdown,
}

/// Handle for communicating with the Google Calendar actor
#[derive(Clone)]
pub struct GoogleCalendarActorHandle {
    command_tx: mpsc::Sender<GoogleCalendarCommand>,
}

impl GoogleCalendarActorHandle {
    /// List calendars visible to the signed-in user
    pub async fn list_calendars(&self) -> SyncResult<Vec<CalendarListEntry>> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(GoogleCalendarCommand::ListCalendars(response_tx))
            .await
            .map_err(|e| google_calendar_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| google_calendar_error("Response channel closed"))?
    }

    /// Get events of the selected calendars in a time range
    pub async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<EventBatch> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(GoogleCalendarCommand::GetEvents(start, end, response_tx))
            .await
            .map_err(|e| google_calendar_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| google_calendar_error("Response channel closed"))?
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> SyncResult<()> {
        let _ = self.command_tx.send(GoogleCalendarCommand::Shutdown).await;
        Ok(())
    }
}

impl GoogleCalendarActor {
    /// Create a new actor and return its handle
    pub fn new(config: Arc<RwLock<Config>>, store: StoreHandle) -> (Self, GoogleCalendarActorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);

        let actor = Self {
            config: Arc::clone(&config),
            token_manager: TokenManager::new(Arc::clone(&config), store.clone()),
            client: Client::new(),
            command_rx,
            store,
        };

        let handle = GoogleCalendarActorHandle { command_tx };

        (actor, handle)
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Google Calendar actor started");

        // Process commands
        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                GoogleCalendarCommand::ListCalendars(response_tx) => {
                    let result = self.list_calendars().await;
                    let _ = response_tx.send(result).await;
                }
                GoogleCalendarCommand::GetEvents(start, end, response_tx) => {
                    let result = self.get_events(start, end).await;
                    let _ = response_tx.send(result).await;
                }
                GoogleCalendarCommand::Shutdown => {
                    info!("Google Calendar actor shutting down");
                    break;
                }
            }
        }

        info!("Google Calendar actor shut down");
    }

    async fn api_url(&self, segments: &[&str]) -> SyncResult<Url> {
        let base = self.config.read().await.endpoints.google_api_base.clone();
        let mut url = Url::parse(&base)
            .map_err(|e| google_calendar_error(&format!("Failed to parse URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| google_calendar_error("API base URL cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET a JSON document with one refresh on 401
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> SyncResult<T> {
        let response =
            send_with_refresh(&self.token_manager, |_| self.client.get(url.clone())).await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: DeserializeOwned>(response: Response) -> SyncResult<T> {
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(google_calendar_error(&format!(
                "Request failed: HTTP {} - {}",
                status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to parse response: {}", e)))
    }

    /// Fetch the user's calendar list, following pagination
    async fn list_calendars(&self) -> SyncResult<Vec<CalendarListEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut url = self.api_url(&["users", "me", "calendarList"]).await?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let page: CalendarListPage = self.get_json(url).await?;
            entries.extend(page.items.into_iter().map(|item| item.into_entry()));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(entries)
    }

    /// Calendars to read events from
    async fn selected_calendars(&self) -> SyncResult<Vec<String>> {
        if let Some(ids) = self.store.get_selected_calendars(Provider::Google).await? {
            if !ids.is_empty() {
                return Ok(ids);
            }
        }

        let configured = self.config.read().await.google_calendar_ids.clone();
        if !configured.is_empty() {
            return Ok(configured);
        }

        Ok(vec!["primary".to_string()])
    }

    /// Get events from all selected calendars in `[start, end)`
    async fn get_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> SyncResult<EventBatch> {
        let tz = self.config.read().await.tz();
        let mut batch = EventBatch::default();

        for calendar_id in self.selected_calendars().await? {
            match self.get_calendar_events(&calendar_id, start, end, &tz).await {
                Ok(mut calendar_events) => batch.events.append(&mut calendar_events),
                // An expired sign-in affects every calendar, give up right away
                Err(e) if e.is_unauthorized() => return Err(e),
                Err(e) => {
                    warn!("Skipping Google calendar {}: {}", calendar_id, e);
                    batch.skipped.push(calendar_id);
                }
            }
        }

        batch.events.sort_by_key(|e| e.start);
        Ok(batch)
    }

    async fn get_calendar_events(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tz: &chrono_tz::Tz,
    ) -> SyncResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut url = self.api_url(&["calendars", calendar_id, "events"]).await?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("timeMin", &start.to_rfc3339())
                    .append_pair("timeMax", &end.to_rfc3339())
                    .append_pair("singleEvents", "true")
                    .append_pair("orderBy", "startTime");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page: EventsPage = self.get_json(url).await?;
            events.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.into_event(calendar_id, tz)),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Fetched {} events from Google calendar {}", events.len(), calendar_id);
        Ok(events)
    }
}
