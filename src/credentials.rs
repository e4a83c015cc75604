//! OAuth2 access token acquisition.
//!
//! The [`CredentialProvider`] trait hands out short-lived bearer tokens.
//! [`RefreshTokenProvider`] exchanges a long-lived refresh token at the
//! Google token endpoint and caches the result until shortly before it
//! expires.  The cache lock is held across the refresh call, so concurrent
//! requests that find the cache stale wait for a single in-flight refresh
//! instead of racing each other.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::GoogleConfig;

/// Seconds shaved off the advertised lifetime before a token is refreshed.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// A bearer credential. The value is never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token string.
    pub fn secret(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Source of access tokens for outbound Drive calls.
pub trait CredentialProvider: Send + Sync + 'static {
    /// Return a currently valid access token, refreshing if needed.
    fn access_token(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<AccessToken>> + Send + '_>>;
}

/// Provider that always returns the same token.
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }
}

impl CredentialProvider for StaticTokenProvider {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<AccessToken>> + Send + '_>> {
        let token = self.token.clone();
        Box::pin(async move { Ok(token) })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Cached access token with expiry.
struct CachedToken {
    token: AccessToken,
    expiry: Instant,
}

/// Refresh-token grant against an OAuth2 token endpoint.
pub struct RefreshTokenProvider {
    client: reqwest::Client,
    token_uri: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cache: Mutex<Option<CachedToken>>,
}

impl RefreshTokenProvider {
    /// Build a provider from the Google section of the configuration.
    pub fn new(client: reqwest::Client, google: &GoogleConfig) -> Self {
        info!("OAuth refresh-token provider configured: token_uri={}", google.token_uri);
        Self {
            client,
            token_uri: google.token_uri.clone(),
            client_id: google.client_id.clone(),
            client_secret: google.client_secret.clone(),
            refresh_token: google.refresh_token.clone(),
            cache: Mutex::new(None),
        }
    }

    /// Exchange the refresh token for a fresh access token.
    async fn token_from_refresh(&self) -> anyhow::Result<(AccessToken, u64)> {
        let resp = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Token refresh request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Token refresh failed ({status}): {body}"));
        }

        let token_resp: TokenResponse = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Malformed token response: {e}"))?;
        let access_token = token_resp
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No access_token in token response"))?;
        let expires_in = token_resp.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        Ok((AccessToken::new(access_token), expires_in))
    }
}

impl CredentialProvider for RefreshTokenProvider {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<AccessToken>> + Send + '_>> {
        Box::pin(async move {
            let mut cache = self.cache.lock().await;
            if let Some(ref cached) = *cache {
                if cached.expiry > Instant::now() {
                    return Ok(cached.token.clone());
                }
            }

            debug!("Refreshing OAuth access token");
            let (token, expires_in) = self.token_from_refresh().await?;
            let expiry =
                Instant::now() + Duration::from_secs(expires_in.saturating_sub(EXPIRY_MARGIN_SECS));
            *cache = Some(CachedToken {
                token: token.clone(),
                expiry,
            });

            Ok(token)
        })
    }
}
