use std::path::PathBuf;

use dbchat_core::BudgetError;
use dbchat_store::StoreError;
use thiserror::Error;

/// Failures of one function-calling round trip.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend asked for another function while narrating a result.
    #[error("backend requested '{0}' while narrating a function result")]
    UnexpectedInvocation(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("context exhausted: {required} tokens required but the budget is {budget}")]
    BudgetUnsatisfiable { required: u32, budget: u32 },

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("a turn is already in progress for this conversation")]
    TurnInProgress,

    #[error("stored conversation is corrupt: {0}")]
    CorruptRecord(String),

    #[error("failed to export conversation to {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    /// Text shown to the person chatting.
    pub fn user_message(&self) -> String {
        match self {
            Self::BudgetUnsatisfiable { .. } => {
                "Your message is too long for the remaining context. Shorten it or clear the conversation."
                    .to_string()
            }
            Self::BackendUnavailable(_) => {
                "The assistant is unavailable right now. Please try again in a moment.".to_string()
            }
            Self::StorageUnavailable(_) => {
                "Conversation history could not be reached, so the action was not completed."
                    .to_string()
            }
            Self::TurnInProgress => {
                "Please wait for the current reply before sending another message.".to_string()
            }
            Self::CorruptRecord(_) => {
                "The saved history of this conversation could not be read. Clear it to start over."
                    .to_string()
            }
            Self::Export { path, .. } => {
                format!("Could not export the conversation to {}.", path.display())
            }
        }
    }
}

impl From<BudgetError> for SessionError {
    fn from(error: BudgetError) -> Self {
        // Tokenizer failures are a separate type raised at startup only.
        match error {
            BudgetError::Unsatisfiable { required, budget } => {
                Self::BudgetUnsatisfiable { required, budget }
            }
        }
    }
}

impl From<BridgeError> for SessionError {
    fn from(error: BridgeError) -> Self {
        Self::BackendUnavailable(error.to_string())
    }
}

impl From<StoreError> for SessionError {
    fn from(error: StoreError) -> Self {
        if error.is_unavailable() {
            Self::StorageUnavailable(error.to_string())
        } else {
            Self::CorruptRecord(error.to_string())
        }
    }
}
