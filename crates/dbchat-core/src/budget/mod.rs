//! Token budget management for chat transcripts.
//!
//! # Key Components
//!
//! - [`counter`]: Token counting (exact tiktoken, heuristic, whitespace)
//! - [`window`]: Budgeted transcript with FIFO eviction and a pinned system prompt
//! - [`types`]: `WindowUsage`, `BudgetError`, `TokenizerError`

pub mod counter;
pub mod types;
pub mod window;

pub use counter::{
    build_counter, HeuristicTokenCounter, SharedTokenCounter, TiktokenCounter, TokenCounter,
    TokenCounterKind, WhitespaceTokenCounter,
};
pub use types::{BudgetError, TokenizerError, WindowUsage};
pub use window::ConversationWindow;
