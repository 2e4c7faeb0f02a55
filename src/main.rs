use calfocus::components::calendar::{current_event, next_event, CalendarSource, Provider};
use calfocus::components::focus::{self, FocusController};
use calfocus::components::google_calendar::TokenManager as GoogleTokens;
use calfocus::components::microsoft_calendar::TokenManager as MicrosoftTokens;
use calfocus::error::{chat_error, config_error, other_error};
use calfocus::startup::{self, Services};
use calfocus::utils::time::{format_clock, format_relative};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tracing::info;

/// Keep Focus Mode and chat status in step with your calendars
#[derive(Debug, Parser)]
#[command(name = "calfocus", version, about)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the automation until interrupted (default)
    Run,
    /// Run a single automation tick and exit
    Tick,
    /// Show the current and next meeting
    Status,
    /// List calendars; `*` marks the ones being watched
    Calendars {
        #[arg(long)]
        provider: Option<Provider>,
    },
    /// Choose which calendars to watch (no ids resets to the default)
    Select {
        provider: Provider,
        ids: Vec<String>,
    },
    /// Turn Focus Mode on or off right now
    Focus { state: Toggle },
    /// List available shortcuts and check the configured ones exist
    Shortcuts,
    /// Show, set or clear the chat status
    ChatStatus {
        text: Option<String>,
        #[arg(long)]
        emoji: Option<String>,
        #[arg(long, conflicts_with = "text")]
        clear: bool,
    },
    /// Forget the stored sign-in for a provider
    Logout { provider: Provider },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    startup::init_logging(cli.verbose)?;

    // Load configuration
    let config = startup::load_config().await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!("Starting calfocus");
            startup::run_daemon(config).await
        }
        command => {
            let services = startup::start_services(config).await?;
            let result = run_command(&services, command).await;
            calfocus::shutdown::shutdown_components(&services.components, &services.store).await;
            result
        }
    }
}

async fn run_command(services: &Services, command: Command) -> miette::Result<()> {
    match command {
        Command::Run => return Err(other_error("`run` is not a one-shot command").into()),
        Command::Tick => {
            let automation = startup::build_automation(services).await;
            automation.load_state().await;
            let outcome = automation.tick(Utc::now()).await?;
            match outcome.transition {
                Some(transition) => println!("Applied: {:?}", transition),
                None if !outcome.complete => println!("No change (some calendars did not answer)"),
                None => println!("No change"),
            }
        }
        Command::Status => print_status(services).await?,
        Command::Calendars { provider } => print_calendars(services, provider).await?,
        Command::Select { provider, ids } => {
            services.store.save_selected_calendars(provider, &ids).await?;
            if ids.is_empty() {
                println!("{} calendar selection reset", provider);
            } else {
                println!("Watching {} {} calendar(s)", ids.len(), provider);
            }
        }
        Command::Focus { state } => {
            let controller = focus::from_config(&*services.config.read().await);
            controller.set_focus(matches!(state, Toggle::On)).await?;
            println!("Focus {}", if matches!(state, Toggle::On) { "on" } else { "off" });
        }
        Command::Shortcuts => {
            let controller = focus::from_config(&*services.config.read().await);
            for name in controller.list_shortcuts().await? {
                println!("{}", name);
            }
            let (on, off) = controller.shortcut_names();
            if let Err(e) = focus::check_shortcuts(&controller, &[on, off]).await {
                eprintln!("{}", e);
            }
        }
        Command::ChatStatus { text, emoji, clear } => {
            let client = services
                .components
                .chat_client()
                .await
                .ok_or_else(|| chat_error("CHAT_TOKEN is not set"))?;
            if clear {
                client.clear_status().await?;
                println!("Status cleared");
            } else if let Some(text) = text {
                client
                    .set_status(&text, emoji.as_deref().unwrap_or(""), None)
                    .await?;
                println!("Status set");
            } else {
                let status = client.get_status().await?;
                if status.is_clear() {
                    println!("(no status)");
                } else {
                    println!("{} {}", status.emoji, status.text);
                }
            }
        }
        Command::Logout { provider } => {
            let config = Arc::clone(&services.config);
            match provider {
                Provider::Google => GoogleTokens::new(config, services.store.clone()).sign_out().await?,
                Provider::Microsoft => {
                    MicrosoftTokens::new(config, services.store.clone()).sign_out().await?
                }
            }
            println!("Signed out of {}", provider);
        }
    }

    Ok(())
}

async fn print_status(services: &Services) -> miette::Result<()> {
    let automation = startup::build_automation(services).await;
    automation.load_state().await;
    let tz = services.config.read().await.tz();
    let now = Utc::now();

    let state = automation.state().await;
    println!(
        "Automation state: {}",
        if state.in_meeting { "in a meeting" } else { "free" }
    );

    let batch = automation.fetch_events(now).await?;
    let events = batch.events;
    let include_all_day = automation.settings().include_all_day;

    if !batch.skipped.is_empty() {
        println!("Unavailable: {}", batch.skipped.join(", "));
    }

    match current_event(&events, &now, include_all_day) {
        Some(event) => println!(
            "Now: {} until {} ({})",
            event.title(),
            format_clock(&event.end, &tz),
            format_relative(&now, &event.end)
        ),
        None => println!("Now: free"),
    }

    match next_event(&events, &now, include_all_day) {
        Some(event) => println!(
            "Next: {} at {} ({})",
            event.title(),
            format_clock(&event.start, &tz),
            format_relative(&now, &event.start)
        ),
        None => println!("Next: nothing scheduled"),
    }

    Ok(())
}

async fn print_calendars(services: &Services, provider: Option<Provider>) -> miette::Result<()> {
    let mut sources = services.components.calendar_sources().await;
    sources.retain(|s| provider.map_or(true, |p| s.provider() == p));

    if sources.is_empty() {
        return Err(config_error("No matching calendar provider is configured").into());
    }

    for source in sources {
        let selected = services
            .store
            .get_selected_calendars(source.provider())
            .await?
            .unwrap_or_default();
        let calendars = source
            .list_calendars()
            .await
            .map_err(|e| other_error(&format!("{}: {}", source.provider(), e)))?;

        println!("{}:", source.provider());
        for calendar in calendars {
            let marker = if selected.contains(&calendar.id)
                || (selected.is_empty() && calendar.primary)
            {
                "*"
            } else {
                " "
            };
            println!("  {} {}  ({})", marker, calendar.name, calendar.id);
        }
    }

    Ok(())
}
