use miette::{Diagnostic, Result};
use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Environment error: {0}")]
    #[diagnostic(code(calfocus::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(calfocus::config))]
    Config(String),

    #[error("Google Calendar API error: {0}")]
    #[diagnostic(code(calfocus::google_calendar))]
    GoogleCalendar(String),

    #[error("Microsoft Graph API error: {0}")]
    #[diagnostic(code(calfocus::microsoft_calendar))]
    MicrosoftCalendar(String),

    #[error("Unauthorized: {0}")]
    #[diagnostic(
        code(calfocus::unauthorized),
        help("Run `authorize google` or `authorize microsoft` to sign in again")
    )]
    Unauthorized(String),

    #[error("Chat status error: {0}")]
    #[diagnostic(code(calfocus::chat))]
    Chat(String),

    #[error("Focus mode error: {0}")]
    #[diagnostic(code(calfocus::focus))]
    Focus(String),

    #[error("Store error: {0}")]
    #[diagnostic(code(calfocus::store))]
    Store(String),

    #[error("Component error: {0}")]
    #[diagnostic(code(calfocus::component))]
    Component(String),

    #[error("HTTP error: {0}")]
    #[diagnostic(code(calfocus::http))]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    #[diagnostic(code(calfocus::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(calfocus::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(calfocus::other))]
    Other(String),
}

impl Error {
    /// Whether a fresh sign-in (or token refresh) could fix this error
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }
}

// Implement From for TOML deserialization errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Store(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type SyncResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create component errors
pub fn component_error(message: &str) -> Error {
    Error::Component(message.to_string())
}

/// Helper to create Google Calendar errors
pub fn google_calendar_error(message: &str) -> Error {
    Error::GoogleCalendar(message.to_string())
}

/// Helper to create Microsoft Graph errors
pub fn microsoft_calendar_error(message: &str) -> Error {
    Error::MicrosoftCalendar(message.to_string())
}

/// Helper to create chat status errors
pub fn chat_error(message: &str) -> Error {
    Error::Chat(message.to_string())
}

/// Helper to create focus mode errors
pub fn focus_error(message: &str) -> Error {
    Error::Focus(message.to_string())
}

/// Helper to create store errors
pub fn store_error(message: &str) -> Error {
    Error::Store(message.to_string())
}

/// Helper to create other errors
pub fn other_error(message: &str) -> Error {
    Error::Other(message.to_string())
}
