//! Pluggable OAuth token storage providers
//!
//! Tokens obtained by `autopilot auth` are persisted here so the server and
//! CLI can refresh access tokens without the refresh token living in the
//! environment.
//!
//! # Configuration
//!
//! In `config.toml`:
//!
//! ```toml
//! [tokens]
//! provider = "file"
//! path = "/var/lib/autopilot/tokens.json"  # optional
//! ```

mod file;

pub use file::FileTokenProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, TokenProviderConfig};
use crate::error::Result;

/// Access tokens are treated as expired this many seconds early
const EXPIRY_GRACE_SECS: i64 = 300;

/// OAuth tokens for the mailbox owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// Access token for API calls
    pub access_token: String,

    /// Refresh token for obtaining new access tokens
    pub refresh_token: String,

    /// Token expiry timestamp (Unix seconds)
    pub expires_at: i64,

    /// Token scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OAuthTokens {
    /// Check if the access token is expired or will expire soon
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.expires_at < now + EXPIRY_GRACE_SECS
    }
}

/// Trait for OAuth token storage backends
///
/// Implementations must be thread-safe (`Send + Sync`) since concurrent REST
/// requests refresh through the same provider.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get the stored tokens, if any
    async fn get_tokens(&self) -> Result<Option<OAuthTokens>>;

    /// Store tokens, replacing any existing ones
    async fn store_tokens(&self, tokens: &OAuthTokens) -> Result<()>;

    /// Delete stored tokens
    async fn delete_tokens(&self) -> Result<()>;

    /// Check if tokens exist
    async fn has_tokens(&self) -> Result<bool> {
        Ok(self.get_tokens().await?.is_some())
    }
}

/// Create a token provider based on configuration
pub fn create_token_provider(config: &Config) -> Arc<dyn TokenProvider> {
    match &config.tokens {
        TokenProviderConfig::File { .. } => Arc::new(FileTokenProvider::new(config.token_file())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(expires_in: i64) -> OAuthTokens {
        OAuthTokens {
            access_token: "test".to_string(),
            refresh_token: "test".to_string(),
            expires_at: chrono::Utc::now().timestamp() + expires_in,
            scopes: vec![],
        }
    }

    #[test]
    fn test_oauth_tokens_expiry() {
        let fresh = tokens(3600);
        assert!(!fresh.is_expired());

        let expired = tokens(-100);
        assert!(expired.is_expired());

        // Within the grace period
        let soon = tokens(60);
        assert!(soon.is_expired());
    }

    #[tokio::test]
    async fn test_file_provider_creation() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.tokens = TokenProviderConfig::File {
            path: Some(dir.path().join("tokens.json")),
        };

        let provider = create_token_provider(&config);
        assert!(!provider.has_tokens().await.unwrap());
    }
}
