//! Data models for AutoPilot
//!
//! Gmail message payloads, extracted content, and conversation state.

mod content;
mod conversation;
mod payload;

pub use content::*;
pub use conversation::*;
pub use payload::*;
