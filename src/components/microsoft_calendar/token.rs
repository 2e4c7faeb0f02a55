use crate::components::calendar::token::{
    access_token_of, is_fresh, merge_refreshed, refresh_token_of, stamp_expiry, AccessTokenSource,
};
use crate::components::store::{keys, StoreHandle};
use crate::config::Config;
use crate::error::{microsoft_calendar_error, Error, SyncResult};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

/// Delegated permissions requested at sign-in
pub const MICROSOFT_SCOPES: &str = "offline_access User.Read Calendars.Read";

const VERIFIER_LEN: usize = 64;

/// PKCE verifier and its S256 challenge
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh random verifier
    pub fn new() -> Self {
        let verifier: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(VERIFIER_LEN)
            .map(char::from)
            .collect();
        Self::from_verifier(verifier)
    }

    /// Derive the challenge for a known verifier
    pub fn from_verifier(verifier: String) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        Self { verifier, challenge }
    }
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

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

    async fn client_id(&self) -> SyncResult<String> {
        self.config
            .read()
            .await
            .microsoft_client_id
            .clone()
            .ok_or_else(|| microsoft_calendar_error("MICROSOFT_CLIENT_ID is not set"))
    }

    async fn endpoint(&self, name: &str) -> String {
        let config_read = self.config.read().await;
        format!(
            "{}/{}/oauth2/v2.0/{}",
            config_read.endpoints.microsoft_login_base.trim_end_matches('/'),
            config_read.microsoft_tenant,
            name
        )
    }

    /// Build the sign-in URL carrying the PKCE challenge
    pub async fn authorization_url(&self, state: &str, pkce: &PkceChallenge) -> SyncResult<String> {
        let client_id = self.client_id().await?;
        let redirect_uri = self.config.read().await.redirect_uri.clone();

        let mut url = Url::parse(&self.endpoint("authorize").await)
            .map_err(|e| microsoft_calendar_error(&format!("Failed to parse URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", MICROSOFT_SCOPES)
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(url.to_string())
    }

    /// Exchange an authorization code plus the PKCE verifier for tokens
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> SyncResult<Value> {
        let client_id = self.client_id().await?;
        let redirect_uri = self.config.read().await.redirect_uri.clone();

        let params = [
            ("client_id", client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("code_verifier", verifier),
            ("scope", MICROSOFT_SCOPES),
        ];
        let mut token = self.request_token(&params).await?;
        stamp_expiry(&mut token)?;

        self.set_token(&token).await?;
        info!("Microsoft token stored");

        Ok(token)
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> SyncResult<Value> {
        let response = self
            .client
            .post(self.endpoint("token").await)
            .form(params)
            .send()
            .await
            .map_err(|e| microsoft_calendar_error(&format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            // invalid_grant: the refresh token expired or consent was revoked
            if status.as_u16() == 400 || status.as_u16() == 401 {
                return Err(Error::Unauthorized(format!(
                    "Microsoft rejected the token request: {}",
                    error_body
                )));
            }
            return Err(microsoft_calendar_error(&format!(
                "Token request failed: HTTP {} - {}",
                status, error_body
            )));
        }

        let token: Value = response
            .json()
            .await
            .map_err(|e| microsoft_calendar_error(&format!("Failed to parse token response: {}", e)))?;
        if access_token_of(&token).is_none() {
            return Err(microsoft_calendar_error("Token response missing 'access_token' field"));
        }

        Ok(token)
    }

    async fn stored_token(&self) -> SyncResult<Value> {
        self.store
            .get_token(keys::MICROSOFT_CALENDAR_TOKEN)
            .await?
            .ok_or_else(|| {
                Error::Unauthorized(
                    "No Microsoft token found. Run `authorize microsoft` first.".to_string(),
                )
            })
    }

    /// Get a usable token, refreshing it when it is about to expire
    pub async fn get_token(&self) -> SyncResult<Value> {
        let token = self.stored_token().await?;
        if is_fresh(&token, Utc::now().timestamp()) {
            return Ok(token);
        }
        self.refresh_token(&token).await
    }

    async fn refresh_token(&self, token: &Value) -> SyncResult<Value> {
        let refresh_token = refresh_token_of(token).ok_or_else(|| {
            Error::Unauthorized("No refresh token in Microsoft token data".to_string())
        })?;
        let client_id = self.client_id().await?;

        let params = [
            ("client_id", client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", MICROSOFT_SCOPES),
        ];
        let refreshed = self.request_token(&params).await?;

        let merged = merge_refreshed(token, refreshed)?;
        self.set_token(&merged).await?;
        info!("Microsoft token refreshed");

        Ok(merged)
    }

    /// Store a token, replacing any previous one
    pub async fn set_token(&self, token: &Value) -> SyncResult<()> {
        self.store.save_token(keys::MICROSOFT_CALENDAR_TOKEN, token).await
    }

    /// Forget the stored token
    pub async fn sign_out(&self) -> SyncResult<()> {
        self.store.delete_token(keys::MICROSOFT_CALENDAR_TOKEN).await
    }
}

#[async_trait]
impl AccessTokenSource for TokenManager {
    async fn access_token(&self) -> SyncResult<String> {
        let token = self.get_token().await?;
        access_token_of(&token)
            .map(str::to_string)
            .ok_or_else(|| microsoft_calendar_error("No access token available"))
    }

    async fn force_refresh(&self) -> SyncResult<String> {
        let token = self.stored_token().await?;
        let token = self.refresh_token(&token).await?;
        access_token_of(&token)
            .map(str::to_string)
            .ok_or_else(|| microsoft_calendar_error("No access token available"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_matches_rfc7636_example() {
        let pkce =
            PkceChallenge::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn generated_verifiers_are_unique_and_long_enough() {
        let a = PkceChallenge::new();
        let b = PkceChallenge::new();
        assert_eq!(a.verifier.len(), VERIFIER_LEN);
        assert_ne!(a.verifier, b.verifier);
        assert!(!a.challenge.contains('='));
    }
}
