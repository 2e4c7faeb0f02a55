mod client;

pub use client::{ChatStatus, ChatStatusClient};

use crate::config::Config;
use crate::error::SyncResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::store::StoreHandle;

/// Chat status component, holds the client once a token is configured
#[derive(Default)]
pub struct ChatStatusComponent {
    client: RwLock<Option<ChatStatusClient>>,
}

impl ChatStatusComponent {
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
        }
    }

    pub async fn get_client(&self) -> Option<ChatStatusClient> {
        self.client.read().await.clone()
    }
}

#[async_trait]
impl super::Component for ChatStatusComponent {
    fn name(&self) -> &'static str {
        "chat_status"
    }

    async fn init(&self, config: Arc<RwLock<Config>>, _store: StoreHandle) -> SyncResult<()> {
        let config_read = config.read().await;
        let Some(token) = config_read.chat_token.clone() else {
            info!("CHAT_TOKEN not set, chat status sync disabled");
            return Ok(());
        };

        *self.client.write().await = Some(ChatStatusClient::new(
            config_read.endpoints.chat_api_base.clone(),
            token,
        ));
        Ok(())
    }

    async fn shutdown(&self) -> SyncResult<()> {
        self.client.write().await.take();
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
