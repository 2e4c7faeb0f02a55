use crate::error::{chat_error, Error, SyncResult};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Errors that mean the token itself is no good
const AUTH_ERRORS: &[&str] = &[
    "not_authed",
    "invalid_auth",
    "account_inactive",
    "token_revoked",
    "token_expired",
];

/// The user's custom status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatStatus {
    pub text: String,
    pub emoji: String,
    /// Unix seconds, 0 for no expiry
    pub expiration: i64,
}

impl ChatStatus {
    pub fn is_clear(&self) -> bool {
        self.text.is_empty() && self.emoji.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    status_text: String,
    #[serde(default)]
    status_emoji: String,
    #[serde(default)]
    status_expiration: i64,
}

/// Thin wrapper over the chat service's Web API
#[derive(Clone)]
pub struct ChatStatusClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ChatStatusClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn method(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    /// Send a call and unwrap the `{ ok, error }` envelope
    async fn call(&self, request: RequestBuilder, name: &str) -> SyncResult<Envelope> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| chat_error(&format!("{} failed: {}", name, e)))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(Error::Unauthorized(format!("{} rejected the chat token", name)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(chat_error(&format!("{} failed: HTTP {} - {}", name, status, body)));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| chat_error(&format!("Failed to parse {} response: {}", name, e)))?;

        if !envelope.ok {
            let error = envelope.error.unwrap_or_else(|| "unknown_error".to_string());
            if AUTH_ERRORS.contains(&error.as_str()) {
                return Err(Error::Unauthorized(format!("{}: {}", name, error)));
            }
            return Err(chat_error(&format!("{}: {}", name, error)));
        }

        debug!("{} succeeded", name);
        Ok(envelope)
    }

    /// Set the custom status, optionally expiring at `expires_at`
    pub async fn set_status(
        &self,
        text: &str,
        emoji: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> SyncResult<()> {
        let body = json!({
            "profile": {
                "status_text": text,
                "status_emoji": emoji,
                "status_expiration": expires_at.map(|t| t.timestamp()).unwrap_or(0),
            }
        });
        let request = self.client.post(self.method("users.profile.set")).json(&body);
        self.call(request, "users.profile.set").await?;
        Ok(())
    }

    /// Remove the custom status
    pub async fn clear_status(&self) -> SyncResult<()> {
        self.set_status("", "", None).await
    }

    /// Read the current custom status
    pub async fn get_status(&self) -> SyncResult<ChatStatus> {
        let request = self.client.get(self.method("users.profile.get"));
        let envelope = self.call(request, "users.profile.get").await?;
        let profile = envelope
            .profile
            .ok_or_else(|| chat_error("users.profile.get returned no profile"))?;

        Ok(ChatStatus {
            text: profile.status_text,
            emoji: profile.status_emoji,
            expiration: profile.status_expiration,
        })
    }

    /// Pause notifications for `minutes`
    pub async fn set_snooze(&self, minutes: i64) -> SyncResult<()> {
        let minutes = minutes.max(1).to_string();
        let request = self
            .client
            .post(self.method("dnd.setSnooze"))
            .form(&[("num_minutes", minutes.as_str())]);
        self.call(request, "dnd.setSnooze").await?;
        Ok(())
    }

    /// Resume notifications. Ending a snooze that is not active is fine.
    pub async fn end_snooze(&self) -> SyncResult<()> {
        let request = self.client.post(self.method("dnd.endSnooze"));
        match self.call(request, "dnd.endSnooze").await {
            Err(Error::Chat(message)) if message.ends_with("snooze_not_active") => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

