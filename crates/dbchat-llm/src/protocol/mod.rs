//! Conversion between internal messages and the chat-completions wire format.
//!
//! ```text
//! Wire types (OpenAI chat completions, legacy functions)
//!     ↕
//! Internal types (dbchat_core::Message, BackendReply)
//! ```

mod errors;
mod openai;

pub use errors::{ProtocolError, ProtocolResult};
pub use openai::{
    ChatCompletionRequest, ChatCompletionResponse, WireChoice, WireFunctionCall, WireMessage,
};

/// Convert a wire type into an internal type.
pub trait FromProvider<T>: Sized {
    fn from_provider(value: T) -> ProtocolResult<Self>;
}

/// Convert an internal type into a wire type.
pub trait ToProvider<T>: Sized {
    fn to_provider(&self) -> ProtocolResult<T>;
}
