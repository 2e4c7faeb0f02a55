mod actor;
mod handle;
pub mod models;
pub mod token;

pub use handle::MicrosoftCalendarHandle;
pub use token::{PkceChallenge, TokenManager};

use crate::config::Config;
use crate::error::SyncResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::store::StoreHandle;

/// Outlook / Microsoft 365 calendar component backed by Microsoft Graph
#[derive(Default)]
pub struct MicrosoftCalendar {
    handle: RwLock<Option<MicrosoftCalendarHandle>>,
}

impl MicrosoftCalendar {
    pub fn new() -> Self {
        Self {
            handle: RwLock::new(None),
        }
    }

    pub async fn get_handle(&self) -> Option<MicrosoftCalendarHandle> {
        self.handle.read().await.clone()
    }
}

#[async_trait]
impl super::Component for MicrosoftCalendar {
    fn name(&self) -> &'static str {
        "microsoft_calendar"
    }

    async fn init(&self, config: Arc<RwLock<Config>>, store: StoreHandle) -> SyncResult<()> {
        if !config.read().await.microsoft_configured() {
            info!("MICROSOFT_CLIENT_ID not set, Outlook calendar stays disconnected");
            return Ok(());
        }

        let mut handle_lock = self.handle.write().await;
        if handle_lock.is_none() {
            *handle_lock = Some(MicrosoftCalendarHandle::new(config, store));
        }

        Ok(())
    }

    async fn shutdown(&self) -> SyncResult<()> {
        if let Some(handle) = &*self.handle.read().await {
            handle.shutdown().await?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
