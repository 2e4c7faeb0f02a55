use crate::components::calendar::token::{
    access_token_of, is_fresh, merge_refreshed, refresh_token_of, stamp_expiry, AccessTokenSource,
};
use crate::components::store::{keys, StoreHandle};
use crate::config::Config;
use crate::error::{google_calendar_error, Error, SyncResult};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

/// Read-only access to events and the calendar list
pub const GOOGLE_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

#[derive(Clone)]
pub struct TokenManager {
    config: Arc<RwLock<Config>>,
    client: Client,
    store: StoreHandle,
}

impl TokenManager {
    pub fn new(config: Arc<RwLock<Config>>, store: StoreHandle) -> Self {
        Self {
            config,
            client: Client::new(),
            store,
        }
    }

    async fn credentials(&self) -> SyncResult<(String, String)> {
        let config_read = self.config.read().await;
        let client_id = config_read
            .google_client_id
            .clone()
            .ok_or_else(|| google_calendar_error("GOOGLE_CLIENT_ID is not set"))?;
        let client_secret = config_read
            .google_client_secret
            .clone()
            .ok_or_else(|| google_calendar_error("GOOGLE_CLIENT_SECRET is not set"))?;
        Ok((client_id, client_secret))
    }

    /// Build the consent screen URL for the authorization code flow
    pub async fn authorization_url(&self, state: &str) -> SyncResult<String> {
        let (client_id, _) = self.credentials().await?;
        let config_read = self.config.read().await;

        let mut url = Url::parse(&config_read.endpoints.google_auth_url)
            .map_err(|e| google_calendar_error(&format!("Failed to parse URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("redirect_uri", &config_read.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("scope", GOOGLE_SCOPE)
            .append_pair("state", state);

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens and persist them
    pub async fn exchange_code(&self, code: &str) -> SyncResult<Value> {
        let (client_id, client_secret) = self.credentials().await?;
        let (token_url, redirect_uri) = {
            let config_read = self.config.read().await;
            (
                config_read.endpoints.google_token_url.clone(),
                config_read.redirect_uri.clone(),
            )
        };

        let response = self
            .client
            .post(&token_url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to exchange code: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(google_calendar_error(&format!(
                "Failed to get token: HTTP {} - {}",
                status, error_body
            )));
        }

        let mut token: Value = response
            .json()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to parse token response: {}", e)))?;
        if access_token_of(&token).is_none() {
            return Err(google_calendar_error("Token response missing 'access_token' field"));
        }
        stamp_expiry(&mut token)?;

        self.set_token(&token).await?;
        info!("Google Calendar token stored");

        Ok(token)
    }

    /// Get OAuth token from the store, refreshing it when it is about to expire
    pub async fn get_token(&self) -> SyncResult<Value> {
        let token = self.store.get_token(keys::GOOGLE_CALENDAR_TOKEN).await?.ok_or_else(|| {
            Error::Unauthorized("No Google token found. Run `authorize google` first.".to_string())
        })?;

        if is_fresh(&token, Utc::now().timestamp()) {
            return Ok(token);
        }

        self.refresh_token(&token).await
    }

    /// Refresh an expired token
    async fn refresh_token(&self, token: &Value) -> SyncResult<Value> {
        let refresh_token = refresh_token_of(token).ok_or_else(|| {
            Error::Unauthorized("No refresh token in Google token data".to_string())
        })?;
        let (client_id, client_secret) = self.credentials().await?;
        let token_url = self.config.read().await.endpoints.google_token_url.clone();

        let params = [
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to refresh token: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            // invalid_grant means the refresh token was revoked
            if status.as_u16() == 400 || status.as_u16() == 401 {
                return Err(Error::Unauthorized(format!(
                    "Google refused the refresh token: {}",
                    error_body
                )));
            }
            return Err(google_calendar_error(&format!(
                "Failed to refresh token: HTTP {} - {}",
                status, error_body
            )));
        }

        let new_token: Value = response
            .json()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to parse token response: {}", e)))?;

        // Check for required fields
        if access_token_of(&new_token).is_none() {
            return Err(google_calendar_error("Token response missing 'access_token' field"));
        }

        let merged = merge_refreshed(token, new_token)?;
        self.set_token(&merged).await?;
        info!("Google Calendar token refreshed");

        Ok(merged)
    }

    /// Store a token, replacing any previous one
    pub async fn set_token(&self, token: &Value) -> SyncResult<()> {
        self.store.save_token(keys::GOOGLE_CALENDAR_TOKEN, token).await
    }

    /// Forget the stored token
    pub async fn sign_out(&self) -> SyncResult<()> {
        self.store.delete_token(keys::GOOGLE_CALENDAR_TOKEN).await
    }
}

#[async_trait]
impl AccessTokenSource for TokenManager {
    async fn access_token(&self) -> SyncResult<String> {
        let token = self.get_token().await?;
        access_token_of(&token)
            .map(str::to_string)
            .ok_or_else(|| google_calendar_error("No access token available"))
    }

    async fn force_refresh(&self) -> SyncResult<String> {
        let token = self.store.get_token(keys::GOOGLE_CALENDAR_TOKEN).await?.ok_or_else(|| {
            Error::Unauthorized("No Google token found. Run `authorize google` first.".to_string())
        })?;
        let token = self.refresh_token(&token).await?;
        access_token_of(&token)
            .map(str::to_string)
            .ok_or_else(|| google_calendar_error("No access token available"))
    }
}
