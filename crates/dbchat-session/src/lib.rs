//! Conversation orchestration.
//!
//! - `bridge` - the two-phase function-calling round trip
//! - `orchestrator` - open/submit/clear/list over a store and a backend
//! - `conversation` - per-conversation window, turn state and durability
//! - `export` - Markdown transcript export

pub mod bridge;
pub mod config;
pub mod conversation;
pub mod error;
pub mod export;
pub mod orchestrator;

#[cfg(test)]
mod test_support;

pub use bridge::FunctionCallBridge;
pub use config::{SessionConfig, DEFAULT_NARRATION_INSTRUCTION};
pub use conversation::{Conversation, Durability, TurnState};
pub use error::{BridgeError, SessionError};
pub use export::{export_markdown, render_markdown};
pub use orchestrator::{SessionOrchestrator, TurnOutcome};
