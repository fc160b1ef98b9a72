//! Core types for token budget management.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token usage of a conversation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUsage {
    /// Tokens used by the pinned system message (0 when none)
    pub pinned_tokens: u32,
    /// Tokens used by every other message
    pub window_tokens: u32,
    /// pinned + window
    pub total_tokens: u32,
    /// Hard budget of the window
    pub budget: u32,
    /// Headroom kept free for the next reply
    pub reserve: u32,
}

impl WindowUsage {
    /// Calculate percentage of budget used, clamped to 0..=100.
    pub fn usage_percentage(&self) -> f64 {
        if self.budget == 0 {
            return 0.0;
        }
        ((self.total_tokens as f64 / self.budget as f64) * 100.0).clamp(0.0, 100.0)
    }

    pub fn is_over_budget(&self) -> bool {
        self.total_tokens > self.budget
    }
}

/// Errors raised while enforcing a window's budget.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BudgetError {
    /// Even after evicting every evictable message the window does not fit.
    #[error("Context exhausted: {required} tokens required but the budget is {budget} tokens")]
    Unsatisfiable { required: u32, budget: u32 },
}

/// Tokenizer vocabulary could not be loaded. Raised only while building a counter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Failed to load tokenizer for model '{model}': {reason}")]
pub struct TokenizerError {
    pub model: String,
    pub reason: String,
}
