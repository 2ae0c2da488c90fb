//! AutoPilot Core Library
//!
//! Personal email assistant: reads unread Gmail messages, extracts their text
//! and lets a local Ollama model list and summarize them through tools.

pub mod agent;
pub mod config;
pub mod error;
pub mod extract;
pub mod gmail;
pub mod llm;
pub mod models;
pub mod oauth;
pub mod token_provider;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};
pub use models::*;

/// Application name for config paths
pub const APP_NAME: &str = "autopilot";
