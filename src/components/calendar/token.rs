//! Token bookkeeping shared by both OAuth providers.

use crate::error::{Error, SyncResult};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Refresh this many seconds before the recorded expiry
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Fallback lifetime when a token response carries no `expires_in`
pub const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Something that hands out bearer tokens and can be forced to renew them
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// A currently valid access token
    async fn access_token(&self) -> SyncResult<String>;

    /// Renew the token regardless of its recorded expiry
    async fn force_refresh(&self) -> SyncResult<String>;
}

/// Add an absolute `expires_at` (unix seconds) computed from `expires_in`
pub fn stamp_expiry(token: &mut Value) -> SyncResult<()> {
    let expires_in = token
        .get("expires_in")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(DEFAULT_EXPIRES_IN);
    let expires_at = Utc::now().timestamp() + expires_in;

    match token.as_object_mut() {
        Some(obj) => {
            obj.insert("expires_at".to_string(), json!(expires_at));
            Ok(())
        }
        None => Err(Error::Serialization("Token data is not an object".to_string())),
    }
}

/// Combine a refresh response with the stored token. Providers may omit the
/// refresh token on refresh, in which case the old one stays valid.
pub fn merge_refreshed(previous: &Value, mut refreshed: Value) -> SyncResult<Value> {
    stamp_expiry(&mut refreshed)?;

    let has_refresh = refreshed
        .get("refresh_token")
        .and_then(|v| v.as_str())
        .is_some();
    if !has_refresh {
        if let Some(old) = previous.get("refresh_token").cloned() {
            if let Some(obj) = refreshed.as_object_mut() {
                obj.insert("refresh_token".to_string(), old);
            }
        }
    }

    Ok(refreshed)
}

/// Whether the token can be used for at least the expiry margin
pub fn is_fresh(token: &Value, now: i64) -> bool {
    match token.get("expires_at").and_then(|v| v.as_i64()) {
        Some(expires_at) => expires_at > now + EXPIRY_MARGIN_SECS,
        None => false,
    }
}

/// Extract the bearer token string
pub fn access_token_of(token: &Value) -> Option<&str> {
    token.get("access_token").and_then(|t| t.as_str())
}

/// Extract the refresh token string
pub fn refresh_token_of(token: &Value) -> Option<&str> {
    token.get("refresh_token").and_then(|t| t.as_str())
}

/// Send an authorized request. A 401 triggers exactly one forced refresh
/// and a resend; a second 401 is reported as [`Error::Unauthorized`].
pub async fn send_with_refresh<F>(tokens: &dyn AccessTokenSource, build: F) -> SyncResult<Response>
where
    F: Fn(&str) -> RequestBuilder,
{
    let token = tokens.access_token().await?;
    let response = build(&token).bearer_auth(&token).send().await?;

    if response.status() != StatusCode::UNAUTHORIZED {
        return Ok(response);
    }

    debug!("Request was rejected with 401, refreshing token once");
    let token = tokens.force_refresh().await?;
    let response = build(&token).bearer_auth(&token).send().await?;

    if response.status() == StatusCode::UNAUTHORIZED {
        let body = response.text().await.unwrap_or_default();
        warn!("Request still unauthorized after token refresh");
        return Err(Error::Unauthorized(format!(
            "rejected after refresh: {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_stamped_from_expires_in() {
        let mut token = json!({ "access_token": "a", "expires_in": 120 });
        stamp_expiry(&mut token).unwrap();
        let expires_at = token["expires_at"].as_i64().unwrap();
        let now = Utc::now().timestamp();
        assert!((now + 115..=now + 125).contains(&expires_at));
    }

    #[test]
    fn missing_expires_in_defaults_to_an_hour() {
        let mut token = json!({ "access_token": "a" });
        stamp_expiry(&mut token).unwrap();
        let remaining = token["expires_at"].as_i64().unwrap() - Utc::now().timestamp();
        assert!(remaining > DEFAULT_EXPIRES_IN - 5);
    }

    #[test]
    fn refresh_keeps_previous_refresh_token() {
        let previous = json!({ "access_token": "old", "refresh_token": "r1" });
        let merged = merge_refreshed(&previous, json!({ "access_token": "new" })).unwrap();
        assert_eq!(access_token_of(&merged), Some("new"));
        assert_eq!(refresh_token_of(&merged), Some("r1"));

        let rotated =
            merge_refreshed(&previous, json!({ "access_token": "new", "refresh_token": "r2" })).unwrap();
        assert_eq!(refresh_token_of(&rotated), Some("r2"));
    }

    #[test]
    fn freshness_respects_margin() {
        let now = 1_000_000;
        assert!(is_fresh(&json!({ "expires_at": now + 3600 }), now));
        assert!(!is_fresh(&json!({ "expires_at": now + 30 }), now));
        assert!(!is_fresh(&json!({ "access_token": "a" }), now));
    }
}
