use super::actor::{GoogleCalendarActor, GoogleCalendarActorHandle};
use crate::components::calendar::{CalendarListEntry, CalendarSource, EventBatch, Provider};
use crate::components::store::StoreHandle;
use crate::config::Config;
use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Handle for interacting with the Google Calendar actor
#[derive(Clone)]
pub struct GoogleCalendarHandle {
    actor_handle: GoogleCalendarActorHandle,
    _actor_task: Arc<JoinHandle<()>>,
}

impl GoogleCalendarHandle {
    /// Create a new GoogleCalendarHandle and spawn the actor
    pub fn new(config: Arc<RwLock<Config>>, store: StoreHandle) -> Self {
        // Create the actor and get its handle
        let (mut actor, handle) = GoogleCalendarActor::new(config, store);

        // Spawn a task to run the actor
        let actor_task = tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            actor_handle: handle,
            _actor_task: Arc::new(actor_task),
        }
    }

    /// List calendars visible to the signed-in user
    pub async fn list_calendars(&self) -> SyncResult<Vec<CalendarListEntry>> {
        self.actor_handle.list_calendars().await
    }

    /// Get events of the selected calendars in a time range
    pub async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<EventBatch> {
        self.actor_handle.get_events(start, end).await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.actor_handle.shutdown().await
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarHandle {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn list_calendars(&self) -> SyncResult<Vec<CalendarListEntry>> {
        GoogleCalendarHandle::list_calendars(self).await
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<EventBatch> {
        self.get_events(start, end).await
    }
}
