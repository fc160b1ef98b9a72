//! dbchat-core - Core types for the database chat assistant
//!
//! - `message` - Role, Message and the persisted transcript encoding
//! - `budget` - token counting and the budgeted conversation window
//! - `function` - the seam through which backend-requested functions run
//! - `config` - application configuration

pub mod budget;
pub mod config;
pub mod function;
pub mod message;

pub use budget::{
    build_counter, BudgetError, ConversationWindow, SharedTokenCounter, TokenCounter,
    TokenCounterKind, TokenizerError, WindowUsage,
};
pub use config::{AppConfig, ConfigError};
pub use function::{
    parse_arguments, FunctionExecutionError, FunctionExecutor, FunctionSchema, SelectedResources,
};
pub use message::{decode_transcript, encode_transcript, Message, Role};
