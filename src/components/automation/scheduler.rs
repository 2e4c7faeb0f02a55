use super::state::{decide, AutomationState, Transition};
use crate::components::calendar::{current_event, CalendarEvent, CalendarSource, EventBatch};
use crate::components::chat_status::ChatStatusClient;
use crate::components::focus::FocusController;
use crate::components::store::StoreHandle;
use crate::config::Config;
use crate::error::{component_error, Error, SyncResult};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

lazy_static! {
    static ref SCHEDULER_INSTANCES: AtomicU32 = AtomicU32::new(0);
}

/// How far back to look for events that are still running
const LOOKBEHIND_HOURS: i64 = 12;

/// Settings the loop reads once at startup
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub poll_interval: std::time::Duration,
    pub lookahead: Duration,
    pub include_all_day: bool,
    pub chat_status_text: String,
    pub chat_status_emoji: String,
    pub chat_snooze: bool,
}

impl AutomationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: std::time::Duration::from_secs(config.poll_interval.max(1)),
            lookahead: Duration::hours(config.lookahead_hours.max(1)),
            include_all_day: config.include_all_day,
            chat_status_text: config.chat_status_text.clone(),
            chat_status_emoji: config.chat_status_emoji.clone(),
            chat_snooze: config.chat_snooze,
        }
    }
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of a single tick
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub current: Option<CalendarEvent>,
    pub transition: Option<Transition>,
    /// Every source and calendar answered
    pub complete: bool,
}

/// Compares the calendars with the clock and keeps Focus Mode and chat
/// status in step
pub struct Automation {
    sources: Vec<Arc<dyn CalendarSource>>,
    focus: Arc<dyn FocusController>,
    chat: Option<ChatStatusClient>,
    store: StoreHandle,
    settings: AutomationSettings,
    state: Mutex<AutomationState>,
}

impl Automation {
    pub fn new(
        sources: Vec<Arc<dyn CalendarSource>>,
        focus: Arc<dyn FocusController>,
        chat: Option<ChatStatusClient>,
        store: StoreHandle,
        settings: AutomationSettings,
    ) -> Self {
        Self {
            sources,
            focus,
            chat,
            store,
            settings,
            state: Mutex::new(AutomationState::default()),
        }
    }

    /// Restore the last applied state so a restart does not re-toggle
    pub async fn load_state(&self) {
        match self.store.get_automation_state().await {
            Ok(Some(state)) => {
                debug!("Restored automation state: in_meeting={}", state.in_meeting);
                *self.state.lock().await = state;
            }
            Ok(None) => {}
            Err(e) => warn!("Could not restore automation state: {}", e),
        }
    }

    /// Current in-memory state
    pub async fn state(&self) -> AutomationState {
        self.state.lock().await.clone()
    }

    pub fn settings(&self) -> &AutomationSettings {
        &self.settings
    }

    /// Events around `now` from every source. Failing sources are skipped
    /// and named in the batch; the call only fails when no source answered.
    pub async fn fetch_events(&self, now: DateTime<Utc>) -> SyncResult<EventBatch> {
        if self.sources.is_empty() {
            return Err(component_error("No calendar is connected"));
        }

        let start = now - Duration::hours(LOOKBEHIND_HOURS);
        let end = now + self.settings.lookahead;

        let results = join_all(
            self.sources
                .iter()
                .map(|source| source.events_between(start, end)),
        )
        .await;

        let mut batch = EventBatch::default();
        let mut first_error: Option<Error> = None;
        let mut answered = 0;

        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(source_batch) => {
                    answered += 1;
                    batch.merge(source_batch);
                }
                Err(e) => {
                    warn!("Failed to fetch {} events: {}", source.provider(), e);
                    batch.skipped.push(source.provider().key().to_string());
                    first_error.get_or_insert(e);
                }
            }
        }

        if answered == 0 {
            return Err(first_error.unwrap_or_else(|| component_error("No calendar answered")));
        }

        Ok(batch)
    }

    /// Run one comparison at `now` and apply at most one transition
    pub async fn tick(&self, now: DateTime<Utc>) -> SyncResult<TickOutcome> {
        let batch = self.fetch_events(now).await?;
        let complete = batch.is_complete();
        let current = current_event(&batch.events, &now, self.settings.include_all_day).cloned();

        let mut state = self.state.lock().await;
        let transition = match decide(&state, current.as_ref()) {
            // The meeting may sit in a calendar that did not answer
            Some(Transition::Leave) | Some(Transition::Extend(_)) if !complete => {
                warn!(
                    "Holding current state, no answer from: {}",
                    batch.skipped.join(", ")
                );
                None
            }
            transition => transition,
        };

        if let Some(transition) = &transition {
            let next_state = self.apply(transition, now).await?;
            *state = next_state;

            if let Err(e) = self.store.save_automation_state(&state).await {
                warn!("Could not persist automation state: {}", e);
            }
        }

        Ok(TickOutcome {
            current,
            transition,
            complete,
        })
    }

    /// Apply a transition. Focus failures abort so the next tick retries;
    /// chat failures are only logged.
    async fn apply(&self, transition: &Transition, now: DateTime<Utc>) -> SyncResult<AutomationState> {
        match transition {
            Transition::Enter(event) => {
                info!("Meeting started: {} (until {})", event.title(), event.end);
                self.focus.set_focus(true).await?;
                self.update_chat(Some(event), now).await;
                Ok(AutomationState::meeting(event, now))
            }
            Transition::Leave => {
                info!("No meeting in progress, leaving focus");
                self.focus.set_focus(false).await?;
                self.update_chat(None, now).await;
                Ok(AutomationState::free(now))
            }
            Transition::Extend(event) => {
                info!("Moved straight into {} (until {})", event.title(), event.end);
                self.update_chat(Some(event), now).await;
                Ok(AutomationState::meeting(event, now))
            }
        }
    }

    async fn update_chat(&self, event: Option<&CalendarEvent>, now: DateTime<Utc>) {
        let Some(chat) = &self.chat else {
            return;
        };

        let result = match event {
            Some(event) => {
                let status = chat
                    .set_status(
                        &self.settings.chat_status_text,
                        &self.settings.chat_status_emoji,
                        Some(event.end),
                    )
                    .await;
                match (status, self.settings.chat_snooze) {
                    (Ok(()), true) => {
                        let minutes = (event.end - now).num_minutes() + 1;
                        chat.set_snooze(minutes).await
                    }
                    (status, _) => status,
                }
            }
            None => {
                let status = chat.clear_status().await;
                match (status, self.settings.chat_snooze) {
                    (Ok(()), true) => chat.end_snooze().await,
                    (status, _) => status,
                }
            }
        };

        if let Err(e) = result {
            warn!("Failed to update chat status: {}", e);
        }
    }

    /// Tick immediately, then every poll interval until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let instance_count = SCHEDULER_INSTANCES.fetch_add(1, Ordering::SeqCst) + 1;
        if instance_count > 1 {
            warn!(
                "Multiple automation loops detected! Instance count: {}",
                instance_count
            );
        }

        self.load_state().await;
        info!(
            "Automation loop started, polling every {}s",
            self.settings.poll_interval.as_secs()
        );

        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Automation loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(TickOutcome { transition: Some(t), .. }) => debug!("Applied {:?}", t),
                        Ok(_) => debug!("No change"),
                        // Retried on the next tick
                        Err(e) => error!("Automation tick failed: {}", e),
                    }
                }
            }
        }

        SCHEDULER_INSTANCES.fetch_sub(1, Ordering::SeqCst);
    }
}
