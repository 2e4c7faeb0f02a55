use crate::components::automation::{Automation, AutomationComponent, AutomationSettings};
use crate::components::chat_status::ChatStatusComponent;
use crate::components::focus;
use crate::components::google_calendar::GoogleCalendar;
use crate::components::microsoft_calendar::MicrosoftCalendar;
use crate::components::store::{StoreActor, StoreHandle};
use crate::components::ComponentManager;
use crate::config::Config;
use crate::error::{component_error, Error};
use crate::shutdown;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging(verbose: bool) -> miette::Result<()> {
    let default_filter = if verbose {
        "debug,reqwest=info,hyper=warn"
    } else {
        "info,reqwest=warn,hyper=warn"
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(RwLock::new(config))),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Running components plus the store they share
pub struct Services {
    pub config: Arc<RwLock<Config>>,
    pub components: Arc<ComponentManager>,
    pub store: StoreHandle,
}

/// Spawn the store, register and initialize every component
pub async fn start_services(config: Arc<RwLock<Config>>) -> miette::Result<Services> {
    let store_url = config.read().await.store_url.clone();
    let store = StoreActor::spawn(&store_url)?;

    let mut component_manager = ComponentManager::new(Arc::clone(&config));
    component_manager.register(GoogleCalendar::new());
    component_manager.register(MicrosoftCalendar::new());
    component_manager.register(ChatStatusComponent::new());
    component_manager.register(AutomationComponent::new());

    component_manager.init_all(store.clone()).await?;

    Ok(Services {
        config,
        components: Arc::new(component_manager),
        store,
    })
}

/// Assemble the automation from whatever components are connected
pub async fn build_automation(services: &Services) -> Arc<Automation> {
    let config_read = services.config.read().await;
    let settings = AutomationSettings::from_config(&config_read);
    let focus = Arc::new(focus::from_config(&config_read));
    drop(config_read);

    Arc::new(Automation::new(
        services.components.calendar_sources().await,
        focus,
        services.components.chat_client().await,
        services.store.clone(),
        settings,
    ))
}

/// Run until a termination signal arrives
pub async fn run_daemon(config: Arc<RwLock<Config>>) -> miette::Result<()> {
    let services = start_services(config).await?;

    let automation_enabled = services.config.read().await.is_component_enabled("automation");
    if automation_enabled {
        let automation = build_automation(&services).await;
        let component = services
            .components
            .get::<AutomationComponent>()
            .ok_or_else(|| component_error("Automation component is not registered"))?;
        component.start(automation).await?;
    } else {
        warn!("Automation is disabled, nothing will be toggled");
    }

    // Create shutdown channel
    let (shutdown_send, shutdown_recv) = oneshot::channel();

    let shutdown_components = Arc::clone(&services.components);
    let shutdown_store = services.store.clone();

    // Spawn signal handler task
    tokio::spawn(async move {
        shutdown::handle_signals(shutdown_send, shutdown_components, shutdown_store).await;
    });

    info!("calfocus is running");
    let _ = shutdown_recv.await;
    info!("calfocus stopped");

    Ok(())
}
