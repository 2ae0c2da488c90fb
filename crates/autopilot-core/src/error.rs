//! Error types for AutoPilot

use thiserror::Error;

/// Result type alias using AutoPilot's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for AutoPilot
///
/// A message that cannot be turned into readable text is not an error; see
/// [`crate::models::Extraction`].
#[derive(Error, Debug)]
pub enum Error {
    // Mail provider errors
    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Mail provider error ({status}): {reason}")]
    Provider { status: u16, reason: String },

    // Authentication errors
    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Token refresh failed: {reason}")]
    TokenRefreshFailed { reason: String },

    #[error("Token storage error: {0}")]
    Token(String),

    // Completion service errors
    #[error("Completion service error: {0}")]
    Completion(String),

    // Tool errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Returns true if the provider reported that the message does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Returns true if the user needs to run `autopilot auth` again
    pub fn requires_reauth(&self) -> bool {
        match self {
            Error::TokenRefreshFailed { .. } => true,
            Error::Provider { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    /// Returns a stable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Provider { .. } | Error::Http(_) => "PROVIDER_ERROR",
            Error::OAuth(_) | Error::TokenRefreshFailed { .. } | Error::Token(_) => "AUTH_ERROR",
            Error::Completion(_) => "COMPLETION_ERROR",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Error::Config(_) | Error::InvalidConfig { .. } | Error::TomlParse(_) => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Returns a user-friendly action message for recoverable errors
    pub fn action_hint(&self) -> Option<&'static str> {
        if self.requires_reauth() {
            return Some("Run `autopilot auth` to obtain a new refresh token");
        }
        match self {
            Error::Http(_) => Some("Check your network connection"),
            Error::Completion(_) => Some("Check that the model server is running"),
            _ => None,
        }
    }
}
