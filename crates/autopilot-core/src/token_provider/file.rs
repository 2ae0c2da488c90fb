//! File-based token provider
//!
//! Stores tokens as JSON in ~/.config/autopilot/tokens.json by default.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::{OAuthTokens, TokenProvider};

/// File-based token provider
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    /// Create a provider backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenProvider for FileTokenProvider {
    async fn get_tokens(&self) -> Result<Option<OAuthTokens>> {
        if !self.path.exists() {
            debug!("Token file does not exist: {:?}", self.path);
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&self.path).await?;
        let tokens: OAuthTokens = serde_json::from_str(&contents)
            .map_err(|e| Error::Token(format!("Invalid token file {:?}: {}", self.path, e)))?;
        Ok(Some(tokens))
    }

    async fn store_tokens(&self, tokens: &OAuthTokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_string_pretty(tokens)?;
        tokio::fs::write(&self.path, data).await?;
        debug!("Stored OAuth tokens in {:?}", self.path);
        Ok(())
    }

    async fn delete_tokens(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Deleted OAuth tokens at {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No tokens to delete at {:?}", self.path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OAuthTokens {
        OAuthTokens {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: 1_700_000_000,
            scopes: vec!["https://www.googleapis.com/auth/gmail.modify".to_string()],
        }
    }

    #[tokio::test]
    async fn test_file_provider_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileTokenProvider::new(dir.path().join("tokens.json"));
        assert!(provider.get_tokens().await.unwrap().is_none());
        // Deleting nothing is not an error
        provider.delete_tokens().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_provider_store_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileTokenProvider::new(dir.path().join("sub").join("tokens.json"));
        provider.store_tokens(&sample()).await.unwrap();
        assert!(provider.has_tokens().await.unwrap());

        let stored = provider.get_tokens().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "access");
        assert_eq!(stored.refresh_token, "refresh");

        provider.delete_tokens().await.unwrap();
        assert!(!provider.has_tokens().await.unwrap());
    }
}
