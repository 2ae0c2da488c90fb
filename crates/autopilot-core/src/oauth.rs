//! OAuth 2.0 flow for Google authentication
//!
//! [`OAuthManager`] performs the one-time consent exchange used by
//! `autopilot auth` and acts as the [`CredentialProvider`] for the Gmail
//! client, refreshing the access token as needed.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::GoogleConfig;
use crate::error::{Error, Result};
use crate::token_provider::{OAuthTokens, TokenProvider};

/// Required OAuth scopes for AutoPilot
pub const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify", // Read and label mail
    "https://www.googleapis.com/auth/calendar",     // Calendar access
];

/// Google authorization endpoint
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Supplies bearer credentials for the mail API
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain a valid access token, refreshing it if needed
    async fn refresh(&self) -> Result<String>;

    /// Last access token obtained, which may be stale
    fn cached(&self) -> Option<String>;
}

/// Refresh the credential, falling back to whatever is cached on failure.
///
/// A failed refresh is logged and never fatal here; the provider call that
/// follows reports the authentication problem if the stale token is rejected.
pub async fn bearer_or_stale(provider: &dyn CredentialProvider) -> Option<String> {
    match provider.refresh().await {
        Ok(token) => Some(token),
        Err(e) => {
            warn!("Failed to refresh token: {}", e);
            provider.cached()
        }
    }
}

/// Response from Google token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: String,
    pub scope: Option<String>,
}

/// OAuth manager for handling Google authentication
pub struct OAuthManager {
    config: GoogleConfig,
    client: Client,
    token_provider: Arc<dyn TokenProvider>,
    current: RwLock<Option<OAuthTokens>>,
}

impl OAuthManager {
    /// Create an OAuth manager with token provider
    pub fn new(config: GoogleConfig, token_provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            config,
            client: Client::new(),
            token_provider,
            current: RwLock::new(None),
        }
    }

    /// Generate the OAuth authorization URL
    pub fn authorization_url(&self, state: &str) -> String {
        let scopes = OAUTH_SCOPES.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            AUTH_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri()),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    /// Exchange authorization code for tokens and persist them
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthTokens> {
        info!("Exchanging authorization code for tokens");

        let redirect_uri = self.config.redirect_uri();
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Token exchange failed: {} - {}", status, body);
            return Err(Error::OAuth(format!(
                "Token exchange failed: {} - {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        debug!("Token exchange successful");

        let tokens = OAuthTokens {
            access_token: token_response.access_token,
            refresh_token: token_response
                .refresh_token
                .ok_or_else(|| Error::OAuth("No refresh token in response".to_string()))?,
            expires_at: chrono::Utc::now().timestamp() + token_response.expires_in,
            scopes: parse_scopes(token_response.scope.as_deref()),
        };

        self.token_provider.store_tokens(&tokens).await?;
        *self.current.write() = Some(tokens.clone());

        Ok(tokens)
    }

    /// Resolve the refresh token: configuration first, then the token store
    async fn load_tokens(&self) -> Result<OAuthTokens> {
        let cached = self.current.read().clone();
        if let Some(tokens) = cached {
            return Ok(tokens);
        }

        let stored = self.token_provider.get_tokens().await?;
        let tokens = match (&self.config.refresh_token, stored) {
            (Some(refresh_token), Some(stored)) if &stored.refresh_token == refresh_token => stored,
            (Some(refresh_token), _) => OAuthTokens {
                access_token: String::new(),
                refresh_token: refresh_token.clone(),
                expires_at: 0,
                scopes: OAUTH_SCOPES.iter().map(|s| s.to_string()).collect(),
            },
            (None, Some(stored)) => stored,
            (None, None) => {
                return Err(Error::TokenRefreshFailed {
                    reason: "no refresh token configured; run `autopilot auth`".to_string(),
                })
            }
        };

        *self.current.write() = Some(tokens.clone());
        Ok(tokens)
    }

    /// Refresh the access token against the token endpoint
    pub async fn refresh_token(&self) -> Result<OAuthTokens> {
        let current_tokens = self.load_tokens().await?;

        debug!("Refreshing access token");

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", current_tokens.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::TokenRefreshFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Token refresh failed: {} - {}", status, body);
            return Err(Error::TokenRefreshFailed {
                reason: format!("{} - {}", status, body),
            });
        }

        let token_response: TokenResponse = response.json().await?;

        let new_tokens = OAuthTokens {
            access_token: token_response.access_token,
            // Keep the old refresh token if not provided
            refresh_token: token_response
                .refresh_token
                .unwrap_or(current_tokens.refresh_token),
            expires_at: chrono::Utc::now().timestamp() + token_response.expires_in,
            scopes: current_tokens.scopes,
        };

        *self.current.write() = Some(new_tokens.clone());

        // Persisting is best effort; the in-memory token is already usable
        if let Err(e) = self.token_provider.store_tokens(&new_tokens).await {
            warn!("Failed to persist refreshed tokens: {}", e);
        }
        info!("Refreshed access token");

        Ok(new_tokens)
    }

    /// Get the token provider
    pub fn token_provider(&self) -> &Arc<dyn TokenProvider> {
        &self.token_provider
    }
}

#[async_trait]
impl CredentialProvider for OAuthManager {
    async fn refresh(&self) -> Result<String> {
        let tokens = self.load_tokens().await?;
        if !tokens.access_token.is_empty() && !tokens.is_expired() {
            debug!("Token still valid");
            return Ok(tokens.access_token);
        }
        Ok(self.refresh_token().await?.access_token)
    }

    fn cached(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .map(|t| t.access_token.clone())
            .filter(|t| !t.is_empty())
    }
}

fn parse_scopes(scope: Option<&str>) -> Vec<String> {
    scope
        .map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_else(|| OAUTH_SCOPES.iter().map(|s| s.to_string()).collect())
}

/// Extract `(code, state)` from the loopback callback request line
/// (`GET /oauth/callback?code=...&state=... HTTP/1.1`)
pub fn parse_oauth_callback(request_line: &str) -> Result<(String, String)> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| Error::OAuth("Malformed callback request".to_string()))?;

    let url = url::Url::parse(&format!("http://localhost{}", target))
        .map_err(|e| Error::OAuth(format!("Invalid callback URL: {}", e)))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(Error::OAuth(format!("Authorization denied: {}", value))),
            _ => {}
        }
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok((code, state)),
        _ => Err(Error::OAuth("Callback missing code or state".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_provider::FileTokenProvider;

    fn manager(dir: &tempfile::TempDir, refresh_token: Option<&str>) -> OAuthManager {
        let config = GoogleConfig {
            client_id: "client id".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: refresh_token.map(String::from),
            // Unroutable so any network attempt fails fast
            token_url: "http://127.0.0.1:9/token".to_string(),
            ..GoogleConfig::default()
        };
        let provider = Arc::new(FileTokenProvider::new(dir.path().join("tokens.json")));
        OAuthManager::new(config, provider)
    }

    #[test]
    fn test_authorization_url() {
        let dir = tempfile::tempdir().unwrap();
        let url = manager(&dir, None).authorization_url("state-1");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("gmail.modify"));
        assert!(url.contains("state=state-1"));
    }

    #[test]
    fn test_parse_oauth_callback() {
        let (code, state) =
            parse_oauth_callback("GET /oauth/callback?code=4%2Fabc&state=xyz HTTP/1.1").unwrap();
        assert_eq!(code, "4/abc");
        assert_eq!(state, "xyz");

        assert!(parse_oauth_callback("GET /oauth/callback?error=access_denied HTTP/1.1").is_err());
        assert!(parse_oauth_callback("GET /oauth/callback?code=1 HTTP/1.1").is_err());
        assert!(parse_oauth_callback("").is_err());
    }

    #[tokio::test]
    async fn test_stored_valid_token_skips_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let oauth = manager(&dir, None);
        oauth
            .token_provider()
            .store_tokens(&OAuthTokens {
                access_token: "still-good".to_string(),
                refresh_token: "r".to_string(),
                expires_at: chrono::Utc::now().timestamp() + 3600,
                scopes: vec![],
            })
            .await
            .unwrap();

        assert_eq!(oauth.refresh().await.unwrap(), "still-good");
        assert_eq!(oauth.cached().as_deref(), Some("still-good"));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let oauth = manager(&dir, None);

        assert!(matches!(
            oauth.refresh().await,
            Err(Error::TokenRefreshFailed { .. })
        ));
        // Degraded mode: no credential, no panic
        assert_eq!(bearer_or_stale(&oauth).await, None);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_stale_token() {
        let dir = tempfile::tempdir().unwrap();
        let oauth = manager(&dir, Some("r"));
        oauth
            .token_provider()
            .store_tokens(&OAuthTokens {
                access_token: "stale".to_string(),
                refresh_token: "r".to_string(),
                expires_at: 0,
                scopes: vec![],
            })
            .await
            .unwrap();

        assert_eq!(bearer_or_stale(&oauth).await.as_deref(), Some("stale"));
    }
}
