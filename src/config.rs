use crate::error::{config_error, SyncResult};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;

/// Default poll interval of the automation loop, in seconds
pub const DEFAULT_POLL_INTERVAL: u64 = 60;

/// Default OAuth loopback redirect used by the `authorize` helper
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080";

/// Path of the optional component toggle file
pub const COMPONENTS_FILE: &str = "config/components.toml";

/// Remote endpoints, overridable so tests can point at a mock server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    pub google_api_base: String,
    pub google_auth_url: String,
    pub google_token_url: String,
    pub microsoft_graph_base: String,
    pub microsoft_login_base: String,
    pub chat_api_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            google_api_base: "https://www.googleapis.com/calendar/v3".to_string(),
            google_auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            google_token_url: "https://oauth2.googleapis.com/token".to_string(),
            microsoft_graph_base: "https://graph.microsoft.com/v1.0".to_string(),
            microsoft_login_base: "https://login.microsoftonline.com".to_string(),
            chat_api_base: "https://slack.com/api".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Google OAuth client ID; the Google component is off without it
    pub google_client_id: Option<String>,
    /// Google OAuth client secret
    pub google_client_secret: Option<String>,
    /// Google calendars to watch when no selection has been stored
    pub google_calendar_ids: Vec<String>,
    /// Microsoft (Entra ID) application client ID
    pub microsoft_client_id: Option<String>,
    /// Microsoft tenant, `common` for personal and work accounts
    pub microsoft_tenant: String,
    /// Microsoft calendars to watch when no selection has been stored
    pub microsoft_calendar_ids: Vec<String>,
    /// Redirect URI registered with both OAuth applications
    pub redirect_uri: String,
    /// Chat service user token
    pub chat_token: Option<String>,
    /// Status text shown while in a meeting
    pub chat_status_text: String,
    /// Status emoji shown while in a meeting
    pub chat_status_emoji: String,
    /// Also pause chat notifications for the meeting's duration
    pub chat_snooze: bool,
    /// Shortcut that turns the Focus Mode on
    pub focus_on_shortcut: String,
    /// Shortcut that turns the Focus Mode off
    pub focus_off_shortcut: String,
    /// Binary used to run shortcuts
    pub shortcuts_binary: String,
    /// Seconds between automation ticks
    pub poll_interval: u64,
    /// How far ahead to fetch events, in hours
    pub lookahead_hours: i64,
    /// Let all-day events trigger focus
    pub include_all_day: bool,
    /// Store location: `redis://…`, `memory://` or a file path
    pub store_url: String,
    /// Timezone for display and all-day events
    pub timezone: String,
    /// Map of component names to their enabled status
    pub components: HashMap<String, bool>,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_client_id: None,
            google_client_secret: None,
            google_calendar_ids: Vec::new(),
            microsoft_client_id: None,
            microsoft_tenant: "common".to_string(),
            microsoft_calendar_ids: Vec::new(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            chat_token: None,
            chat_status_text: "In a meeting".to_string(),
            chat_status_emoji: ":calendar:".to_string(),
            chat_snooze: false,
            focus_on_shortcut: "Focus On".to_string(),
            focus_off_shortcut: "Focus Off".to_string(),
            shortcuts_binary: "shortcuts".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            lookahead_hours: 24,
            include_all_day: false,
            store_url: "calfocus-store.json".to_string(),
            timezone: "UTC".to_string(),
            components: default_components(),
            endpoints: Endpoints::default(),
        }
    }
}

fn default_components() -> HashMap<String, bool> {
    let mut components = HashMap::new();
    components.insert("google_calendar".to_string(), true);
    components.insert("microsoft_calendar".to_string(), true);
    components.insert("chat_status".to_string(), true);
    components.insert("automation".to_string(), true);
    components
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> SyncResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let vars: HashMap<String, String> = env::vars().collect();
        let mut config = Self::from_vars(&vars)?;

        // Load components configuration from file if it exists
        if let Ok(content) = fs::read_to_string(COMPONENTS_FILE) {
            config.merge_components(&content);
        }

        Ok(config)
    }

    /// Apply component toggles from a TOML table of `name = bool`.
    /// Malformed content is logged and ignored.
    pub fn merge_components(&mut self, content: &str) {
        match toml::from_str::<HashMap<String, bool>>(content) {
            Ok(file_components) => self.components.extend(file_components),
            Err(e) => tracing::warn!("Ignoring malformed {}: {}", COMPONENTS_FILE, e),
        }
    }

    /// Build a configuration from a variable map, falling back to defaults
    pub fn from_vars(vars: &HashMap<String, String>) -> SyncResult<Self> {
        let defaults = Config::default();
        let get = |key: &str| vars.get(key).filter(|v| !v.trim().is_empty()).cloned();

        let poll_interval = match get("POLL_INTERVAL_SECS") {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| config_error("Invalid POLL_INTERVAL_SECS format"))?,
            None => defaults.poll_interval,
        };
        if poll_interval == 0 {
            return Err(config_error("POLL_INTERVAL_SECS must be greater than zero"));
        }

        let lookahead_hours = match get("LOOKAHEAD_HOURS") {
            Some(value) => value
                .parse::<i64>()
                .map_err(|_| config_error("Invalid LOOKAHEAD_HOURS format"))?,
            None => defaults.lookahead_hours,
        };

        let timezone = get("TIMEZONE").unwrap_or(defaults.timezone);
        if timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(config_error(&format!("Unknown timezone: {}", timezone)));
        }

        let mut endpoints = defaults.endpoints;
        if let Some(url) = get("GOOGLE_API_BASE") {
            endpoints.google_api_base = url;
        }
        if let Some(url) = get("GOOGLE_TOKEN_URL") {
            endpoints.google_token_url = url;
        }
        if let Some(url) = get("MICROSOFT_GRAPH_BASE") {
            endpoints.microsoft_graph_base = url;
        }
        if let Some(url) = get("MICROSOFT_LOGIN_BASE") {
            endpoints.microsoft_login_base = url;
        }
        if let Some(url) = get("CHAT_API_BASE") {
            endpoints.chat_api_base = url;
        }

        Ok(Config {
            google_client_id: get("GOOGLE_CLIENT_ID"),
            google_client_secret: get("GOOGLE_CLIENT_SECRET"),
            google_calendar_ids: split_list(get("GOOGLE_CALENDAR_IDS")),
            microsoft_client_id: get("MICROSOFT_CLIENT_ID"),
            microsoft_tenant: get("MICROSOFT_TENANT").unwrap_or(defaults.microsoft_tenant),
            microsoft_calendar_ids: split_list(get("MICROSOFT_CALENDAR_IDS")),
            redirect_uri: get("REDIRECT_URI").unwrap_or(defaults.redirect_uri),
            chat_token: get("CHAT_TOKEN"),
            chat_status_text: get("CHAT_STATUS_TEXT").unwrap_or(defaults.chat_status_text),
            chat_status_emoji: get("CHAT_STATUS_EMOJI").unwrap_or(defaults.chat_status_emoji),
            chat_snooze: parse_flag(get("CHAT_SNOOZE")),
            focus_on_shortcut: get("FOCUS_ON_SHORTCUT").unwrap_or(defaults.focus_on_shortcut),
            focus_off_shortcut: get("FOCUS_OFF_SHORTCUT").unwrap_or(defaults.focus_off_shortcut),
            shortcuts_binary: get("SHORTCUTS_BINARY").unwrap_or(defaults.shortcuts_binary),
            poll_interval,
            lookahead_hours,
            include_all_day: parse_flag(get("INCLUDE_ALL_DAY")),
            store_url: get("STORE_URL").unwrap_or(defaults.store_url),
            timezone,
            components: defaults.components,
            endpoints,
        })
    }

    /// Check if a component is enabled
    pub fn is_component_enabled(&self, name: &str) -> bool {
        *self.components.get(name).unwrap_or(&false)
    }

    /// Whether Google credentials are present
    pub fn google_configured(&self) -> bool {
        self.google_client_id.is_some() && self.google_client_secret.is_some()
    }

    /// Whether a Microsoft client ID is present
    pub fn microsoft_configured(&self) -> bool {
        self.microsoft_client_id.is_some()
    }

    /// Parsed display timezone
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

/// Split a comma separated list, dropping blanks
fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}
