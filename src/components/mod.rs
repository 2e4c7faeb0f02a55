use crate::config::Config;
use crate::error::SyncResult;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

// Export components
pub mod automation;
pub mod calendar;
pub mod chat_status;
pub mod focus;
pub mod google_calendar;
pub mod microsoft_calendar;
pub mod store;

// Re-export calendar handles
pub use google_calendar::GoogleCalendarHandle;
pub use microsoft_calendar::MicrosoftCalendarHandle;

use calendar::CalendarSource;
use store::StoreHandle;

/// Component trait that all components must implement
#[async_trait]
pub trait Component: Send + Sync + Any {
    /// Get the name of the component
    fn name(&self) -> &'static str;

    /// Initialize the component
    async fn init(&self, config: Arc<RwLock<Config>>, store: StoreHandle) -> SyncResult<()>;

    /// Shutdown the component
    async fn shutdown(&self) -> SyncResult<()>;

    /// Convert to Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Manager for all components
pub struct ComponentManager {
    components: Vec<Box<dyn Component>>,
    config: Arc<RwLock<Config>>,
}

impl fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentManager")
            .field("component_count", &self.components.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ComponentManager {
    /// Create a new component manager
    pub fn new(config: Arc<RwLock<Config>>) -> Self {
        Self {
            components: Vec::new(),
            config,
        }
    }

    /// Get the configuration
    pub fn get_config(&self) -> Arc<RwLock<Config>> {
        Arc::clone(&self.config)
    }

    /// Register a component
    pub fn register<T: Component + 'static>(&mut self, component: T) {
        info!("Registering component: {}", component.name());
        self.components.push(Box::new(component));
    }

    /// Names of registered components, in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Initialize all registered components that are enabled in the config
    pub async fn init_all(&self, store: StoreHandle) -> SyncResult<()> {
        for component in &self.components {
            if !self.config.read().await.is_component_enabled(component.name()) {
                info!("Component {} is disabled, skipping", component.name());
                continue;
            }

            info!("Initializing component: {}", component.name());

            if let Err(e) = component.init(Arc::clone(&self.config), store.clone()).await {
                // Log error but continue with other components
                tracing::error!("Error initializing component {}: {:?}", component.name(), e);
            }
        }

        Ok(())
    }

    /// Shutdown all components, last registered first
    pub async fn shutdown_all(&self) -> SyncResult<()> {
        info!("Shutting down all components");

        for component in self.components.iter().rev() {
            info!("Shutting down component: {}", component.name());

            if let Err(e) = component.shutdown().await {
                // Log error but continue with other components
                tracing::error!(
                    "Error shutting down component {}: {:?}",
                    component.name(),
                    e
                );
            }
        }

        Ok(())
    }

    /// Get a component by name
    pub fn get_component_by_name(&self, name: &str) -> Option<&dyn Component> {
        self.components
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    /// Get a component by its concrete type
    pub fn get<T: Component + 'static>(&self) -> Option<&T> {
        self.components
            .iter()
            .find_map(|c| c.as_any().downcast_ref::<T>())
    }

    /// Calendar handles of every connected provider
    pub async fn calendar_sources(&self) -> Vec<Arc<dyn CalendarSource>> {
        let mut sources: Vec<Arc<dyn CalendarSource>> = Vec::new();

        if let Some(google) = self.get::<google_calendar::GoogleCalendar>() {
            if let Some(handle) = google.get_handle().await {
                sources.push(Arc::new(handle));
            }
        }
        if let Some(microsoft) = self.get::<microsoft_calendar::MicrosoftCalendar>() {
            if let Some(handle) = microsoft.get_handle().await {
                sources.push(Arc::new(handle));
            }
        }

        sources
    }

    /// The chat status client, when the component is connected
    pub async fn chat_client(&self) -> Option<chat_status::ChatStatusClient> {
        match self.get::<chat_status::ChatStatusComponent>() {
            Some(component) => component.get_client().await,
            None => None,
        }
    }
}
