use super::actor::{MicrosoftCalendarActor, MicrosoftCalendarActorHandle};
use crate::components::calendar::{CalendarListEntry, CalendarSource, EventBatch, Provider};
use crate::components::store::StoreHandle;
use crate::config::Config;
use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Handle for interacting with the Microsoft calendar actor
#[derive(Clone)]
pub struct MicrosoftCalendarHandle {
    actor_handle: MicrosoftCalendarActorHandle,
    _actor_task: Arc<JoinHandle<()>>,
}

impl MicrosoftCalendarHandle {
    /// Create a new handle and spawn the actor
    pub fn new(config: Arc<RwLock<Config>>, store: StoreHandle) -> Self {
        let (mut actor, handle) = MicrosoftCalendarActor::new(config, store);

        let actor_task = tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            actor_handle: handle,
            _actor_task: Arc::new(actor_task),
        }
    }

    pub async fn list_calendars(&self) -> SyncResult<Vec<CalendarListEntry>> {
        self.actor_handle.list_calendars().await
    }

    pub async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<EventBatch> {
        self.actor_handle.get_events(start, end).await
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.actor_handle.shutdown().await
    }
}

#[async_trait]
impl CalendarSource for MicrosoftCalendarHandle {
    fn provider(&self) -> Provider {
        Provider::Microsoft
    }

    async fn list_calendars(&self) -> SyncResult<Vec<CalendarListEntry>> {
        MicrosoftCalendarHandle::list_calendars(self).await
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncResult<EventBatch> {
        self.get_events(start, end).await
    }
}
