use async_trait::async_trait;
use dbchat_core::{FunctionSchema, Message};
use thiserror::Error;

use crate::protocol::ProtocolError;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Protocol conversion error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, LLMError>;

/// What the backend answered with: text, or a request to run one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendReply {
    PlainMessage(Message),
    FunctionInvocation { name: String, arguments: String },
}

impl BackendReply {
    pub fn is_invocation(&self) -> bool {
        matches!(self, Self::FunctionInvocation { .. })
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Complete a chat.
    ///
    /// # Arguments
    /// * `messages` - Transcript to send, oldest first
    /// * `functions` - Functions the backend may invoke; empty disables function calling
    async fn complete(
        &self,
        messages: &[Message],
        functions: &[FunctionSchema],
    ) -> Result<BackendReply>;
}
