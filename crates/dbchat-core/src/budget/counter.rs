//! Token counting for budget management.
//!
//! Three interchangeable strategies are provided. Which one is configured
//! decides what a "token" in the window budget means:
//!
//! - [`TiktokenCounter`]: exact BPE count for a named OpenAI model.
//! - [`HeuristicTokenCounter`]: chars/4 plus a 10% safety margin.
//! - [`WhitespaceTokenCounter`]: one token per whitespace-separated word.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;

use crate::budget::types::TokenizerError;
use crate::message::Message;

/// Trait for token counting implementations.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a plain text string. Empty text is always 0.
    fn count_text(&self, text: &str) -> u32;

    /// Count tokens in a single message. Only the content is charged.
    fn count_message(&self, message: &Message) -> u32 {
        self.count_text(message.content())
    }

    /// Count tokens in multiple messages.
    fn count_messages(&self, messages: &[Message]) -> u32 {
        messages
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(self.count_message(m)))
    }
}

/// Arc-wrapped token counter for easy sharing.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

/// Exact counter backed by the model's BPE vocabulary.
pub struct TiktokenCounter {
    model: String,
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Load the vocabulary for `model`. An unknown model is a startup error.
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| TokenizerError {
            model: model.to_string(),
            reason: e.to_string(),
        })?;
        log::debug!("Loaded tokenizer vocabulary for model '{}'", model);
        Ok(Self {
            model: model.to_string(),
            bpe,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        u32::try_from(self.bpe.encode_ordinary(text).len()).unwrap_or(u32::MAX)
    }
}

/// Heuristic token counter using character-based estimation.
///
/// tokens ≈ characters / 4, plus a 10% margin.
#[derive(Debug, Clone)]
pub struct HeuristicTokenCounter {
    /// Characters per token ratio (default: 4)
    chars_per_token: f64,
    /// Safety margin multiplier (default: 1.1 = 10% extra)
    safety_margin: f64,
}

impl HeuristicTokenCounter {
    pub fn new(chars_per_token: f64, safety_margin: f64) -> Self {
        Self {
            chars_per_token,
            safety_margin,
        }
    }

    /// Create with default parameters (chars/4 + 10% margin).
    pub fn with_defaults() -> Self {
        Self::new(4.0, 1.1)
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count() as f64;
        let base_tokens = char_count / self.chars_per_token;
        let adjusted_tokens = base_tokens * self.safety_margin;

        adjusted_tokens.ceil() as u32
    }
}

/// Counts whitespace-separated words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
    }
}

/// Counter strategy selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenCounterKind {
    #[default]
    Tiktoken,
    Heuristic,
    Whitespace,
}

impl std::str::FromStr for TokenCounterKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tiktoken" | "exact" => Ok(Self::Tiktoken),
            "heuristic" => Ok(Self::Heuristic),
            "whitespace" => Ok(Self::Whitespace),
            other => Err(format!("unknown token counter '{}'", other)),
        }
    }
}

/// Build the configured counter. `model` is only consulted for tiktoken.
pub fn build_counter(kind: TokenCounterKind, model: &str) -> Result<SharedTokenCounter, TokenizerError> {
    let counter: SharedTokenCounter = match kind {
        TokenCounterKind::Tiktoken => Arc::new(TiktokenCounter::for_model(model)?),
        TokenCounterKind::Heuristic => Arc::new(HeuristicTokenCounter::default()),
        TokenCounterKind::Whitespace => Arc::new(WhitespaceTokenCounter),
    };
    Ok(counter)
}
