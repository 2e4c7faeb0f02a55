use super::models::{GraphCalendar, GraphEvent, GraphPage};
use super::token::TokenManager;
use crate::components::calendar::token::send_with_refresh;
use crate::components::calendar::{CalendarListEntry, EventBatch, Provider};
use crate::components::store::StoreHandle;
use crate::config::Config;
use crate::error::{microsoft_calendar_error, SyncResult};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

const MAX_PAGES: usize = 20;

/// Ask Graph to report every time in UTC
const PREFER_UTC: &str = "outlook.timezone=\"UTC\"";

/// The Microsoft Graph calendar actor that processes messages
pub struct MicrosoftCalendarActor {
    config: Arc<RwLock<Config>>,
    token_manager: TokenManager,
    client: Client,
    command_rx: mpsc::Receiver<MicrosoftCalendarCommand>,
    store: StoreHandle,
}

/// Commands that can be sent to the Microsoft calendar actor
pub enum MicrosoftCalendarCommand {
    ListCalendars(mpsc::Sender<SyncResult<Vec<CalendarListEntry>>>),
    GetEvents(
        DateTime<Utc>,
        DateTime<Utc>,
        mpsc::Sender<SyncResult<EventBatch>>,
    ),
    Shutdown,
}

/// Handle for communicating with the Microsoft calendar actor
#[derive(Clone)]
pub struct MicrosoftCalendarActorHandle {
    command_tx: mpsc::Sender<MicrosoftCalendarCommand>,
}

impl MicrosoftCalendarActorHandle {
    pub async fn list_calendars(&self) -> SyncResult<Vec<CalendarListEntry>> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(MicrosoftCalendarCommand::ListCalendars(response_tx))
            .await
            .map_err(|e| microsoft_calendar_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| microsoft_calendar_error("Response channel closed"))?
    }

    pub async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<EventBatch> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(MicrosoftCalendarCommand::GetEvents(start, end, response_tx))
            .await
            .map_err(|e| microsoft_calendar_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| microsoft_calendar_error("Response channel closed"))?
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        let _ = self.command_tx.send(MicrosoftCalendarCommand::Shutdown).await;
        Ok(())
    }
}

impl MicrosoftCalendarActor {
    /// Create a new actor and return its handle
    pub fn new(
        config: Arc<RwLock<Config>>,
        store: StoreHandle,
    ) -> (Self, MicrosoftCalendarActorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);

        let actor = Self {
            config: Arc::clone(&config),
            token_manager: TokenManager::new(Arc::clone(&config), store.clone()),
            client: Client::new(),
            command_rx,
            store,
        };

        (actor, MicrosoftCalendarActorHandle { command_tx })
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Microsoft calendar actor started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                MicrosoftCalendarCommand::ListCalendars(response_tx) => {
                    let result = self.list_calendars().await;
                    let _ = response_tx.send(result).await;
                }
                MicrosoftCalendarCommand::GetEvents(start, end, response_tx) => {
                    let result = self.get_events(start, end).await;
                    let _ = response_tx.send(result).await;
                }
                MicrosoftCalendarCommand::Shutdown => {
                    info!("Microsoft calendar actor shutting down");
                    break;
                }
            }
        }

        info!("Microsoft calendar actor shut down");
    }

    async fn graph_url(&self, segments: &[&str]) -> SyncResult<Url> {
        let base = self.config.read().await.endpoints.microsoft_graph_base.clone();
        let mut url = Url::parse(&base)
            .map_err(|e| microsoft_calendar_error(&format!("Failed to parse URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| microsoft_calendar_error("Graph base URL cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Fetch every page of a Graph collection
    async fn get_all<T: DeserializeOwned>(&self, first: Url) -> SyncResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                warn!("Stopping Graph pagination after {} pages", MAX_PAGES);
                break;
            }

            let response = send_with_refresh(&self.token_manager, |_| {
                self.client.get(url.clone()).header("Prefer", PREFER_UTC)
            })
            .await?;

            if !response.status().is_success() {
                let status = response.status();
                let error_body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Could not read error response".to_string());
                return Err(microsoft_calendar_error(&format!(
                    "Request failed: HTTP {} - {}",
                    status, error_body
                )));
            }

            let page: GraphPage<T> = response
                .json()
                .await
                .map_err(|e| microsoft_calendar_error(&format!("Failed to parse response: {}", e)))?;
            items.extend(page.value);

            if let Some(link) = page.next_link {
                let parsed = Url::parse(&link)
                    .map_err(|e| microsoft_calendar_error(&format!("Bad nextLink: {}", e)))?;
                next = Some(parsed);
            }
        }

        Ok(items)
    }

    async fn fetch_calendars(&self) -> SyncResult<Vec<GraphCalendar>> {
        let url = self.graph_url(&["me", "calendars"]).await?;
        self.get_all(url).await
    }

    async fn list_calendars(&self) -> SyncResult<Vec<CalendarListEntry>> {
        let calendars = self.fetch_calendars().await?;
        Ok(calendars.into_iter().map(GraphCalendar::into_entry).collect())
    }

    /// Stored selection, then configured ids, then the default calendar
    async fn selected_calendars(&self) -> SyncResult<Vec<String>> {
        if let Some(ids) = self.store.get_selected_calendars(Provider::Microsoft).await? {
            if !ids.is_empty() {
                return Ok(ids);
            }
        }

        let configured = self.config.read().await.microsoft_calendar_ids.clone();
        if !configured.is_empty() {
            return Ok(configured);
        }

        let calendars = self.fetch_calendars().await?;
        let defaults: Vec<String> = calendars
            .iter()
            .filter(|c| c.is_default_calendar)
            .map(|c| c.id.clone())
            .collect();
        if defaults.is_empty() {
            Ok(calendars.into_iter().map(|c| c.id).collect())
        } else {
            Ok(defaults)
        }
    }

    async fn get_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> SyncResult<EventBatch> {
        let tz = self.config.read().await.tz();
        let mut batch = EventBatch::default();

        for calendar_id in self.selected_calendars().await? {
            let mut url = self
                .graph_url(&["me", "calendars", calendar_id.as_str(), "calendarView"])
                .await?;
            url.query_pairs_mut()
                .append_pair("startDateTime", &start.to_rfc3339_opts(SecondsFormat::Secs, true))
                .append_pair("endDateTime", &end.to_rfc3339_opts(SecondsFormat::Secs, true))
                .append_pair("$top", "100");

            match self.get_all::<GraphEvent>(url).await {
                Ok(items) => {
                    let before = batch.events.len();
                    batch.events.extend(
                        items
                            .into_iter()
                            .filter_map(|item| item.into_event(&calendar_id, &tz)),
                    );
                    debug!(
                        "Fetched {} events from Microsoft calendar {}",
                        batch.events.len() - before,
                        calendar_id
                    );
                }
                Err(e) if e.is_unauthorized() => return Err(e),
                Err(e) => {
                    warn!("Skipping Microsoft calendar {}: {}", calendar_id, e);
                    batch.skipped.push(calendar_id);
                }
            }
        }

        batch.events.sort_by_key(|e| e.start);
        Ok(batch)
    }
}
