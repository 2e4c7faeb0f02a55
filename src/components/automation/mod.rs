mod scheduler;
mod state;

pub use scheduler::{Automation, AutomationSettings, TickOutcome};
pub use state::{decide, AutomationState, Transition};

use crate::config::Config;
use crate::error::{component_error, SyncResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::store::StoreHandle;

/// Owns the running automation loop
#[derive(Default)]
pub struct AutomationComponent {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutomationComponent {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Spawn the loop. Starting twice is an error.
    pub async fn start(&self, automation: Arc<Automation>) -> SyncResult<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(component_error("Automation loop is already running"));
        }

        let cancel = self.cancel.child_token();
        *task = Some(tokio::spawn(async move {
            automation.run(cancel).await;
        }));
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

#[async_trait]
impl super::Component for AutomationComponent {
    fn name(&self) -> &'static str {
        "automation"
    }

    /// The loop needs the calendar handles of other components, so it is
    /// started by [`AutomationComponent::start`] after every component ran
    /// its init.
    async fn init(&self, _config: Arc<RwLock<Config>>, _store: StoreHandle) -> SyncResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> SyncResult<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!("Automation task ended abnormally: {:?}", e);
            }
        }
        info!("Automation stopped");
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
