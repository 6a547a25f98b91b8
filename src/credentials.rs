//! OAuth bearer tokens for requests to the video host.
//!
//! A single [`CredentialProvider`] is built at startup and shared through
//! the application state. It owns its token cache. Concurrent refreshes are
//! harmless; the last writer wins.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ConvertError;

pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const YOUTUBE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";

const REFRESH_MARGIN_SECONDS: i64 = 60;
const DEFAULT_EXPIRES_IN_SECONDS: i64 = 3600;

#[derive(Debug, Clone, Default)]
pub struct OAuthSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub static_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + chrono::Duration::seconds(REFRESH_MARGIN_SECONDS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct CredentialProvider {
    settings: OAuthSettings,
    http_client: reqwest::Client,
    token_endpoint: String,
    cache: RwLock<Option<CachedToken>>,
}

impl CredentialProvider {
    pub fn new(settings: OAuthSettings, http_client: reqwest::Client) -> Self {
        Self {
            settings,
            http_client,
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            cache: RwLock::new(None),
        }
    }

    #[cfg(test)]
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    fn refresh_credentials(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.settings.client_id.as_deref()?,
            self.settings.client_secret.as_deref()?,
            self.settings.refresh_token.as_deref()?,
        ))
    }

    pub fn auto_refresh_enabled(&self) -> bool {
        self.refresh_credentials().is_some()
    }

    /// Returns a usable bearer token, if any. Refresh failures are logged and
    /// fall back to the static token.
    pub async fn get_valid_token(&self) -> Option<String> {
        if !self.auto_refresh_enabled() {
            return self.settings.static_token.clone();
        }

        if let Some(cached) = self.cache.read().await.as_ref()
            && cached.is_fresh(Utc::now())
        {
            return Some(cached.access_token.clone());
        }

        match self.refresh().await {
            Ok(token) => Some(token.access_token),
            Err(error) => {
                warn!("Failed to refresh OAuth token: {error}");
                self.settings.static_token.clone()
            }
        }
    }

    /// Exchanges the refresh token for a new access token and caches it.
    pub async fn refresh(&self) -> Result<CachedToken, ConvertError> {
        let (client_id, client_secret, refresh_token) = self
            .refresh_credentials()
            .ok_or(ConvertError::OAuthNotConfigured)?;

        let response = self
            .post_token_form(
                &[
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                ],
                "Token refresh failed",
            )
            .await?;

        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);
        let expires_at = chrono::Duration::try_seconds(expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                ConvertError::TokenExchange(format!(
                    "Token refresh failed: invalid expires_in {expires_in}"
                ))
            })?;
        let token = CachedToken {
            access_token: response.access_token,
            expires_at,
        };

        *self.cache.write().await = Some(token.clone());
        debug!("OAuth access token refreshed, expires at {}", token.expires_at);
        Ok(token)
    }

    /// One-time setup: trades an authorization code for tokens.
    pub async fn exchange_code_for_tokens(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<TokenPair, ConvertError> {
        let response = self
            .post_token_form(
                &[
                    ("code", code),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                    ("redirect_uri", redirect_uri),
                    ("grant_type", "authorization_code"),
                ],
                "Code exchange failed",
            )
            .await?;

        Ok(TokenPair {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        })
    }

    /// Consent screen URL that starts the setup flow.
    pub fn authorization_url(&self, redirect_uri: &str) -> Option<String> {
        let client_id = self.settings.client_id.as_deref()?;
        Some(format!(
            "{GOOGLE_AUTH_ENDPOINT}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(YOUTUBE_READONLY_SCOPE),
        ))
    }

    async fn post_token_form(
        &self,
        form: &[(&str, &str)],
        failure_prefix: &str,
    ) -> Result<TokenResponse, ConvertError> {
        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|error| ConvertError::TokenExchange(format!("{failure_prefix}: {error}")))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConvertError::TokenExchange(format!(
                "{failure_prefix}: {body}"
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|error| ConvertError::TokenExchange(format!("{failure_prefix}: {error}")))
    }
}

/// Keeps the cache warm so requests rarely wait on a refresh.
pub fn spawn_background_refresh(provider: Arc<CredentialProvider>, every: Duration) {
    if !provider.auto_refresh_enabled() {
        return;
    }

    info!("OAuth auto-refresh enabled, refreshing every {}s", every.as_secs());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(error) = provider.refresh().await {
                warn!("Background OAuth refresh failed: {error}");
            }
        }
    });
}
