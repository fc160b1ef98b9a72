pub mod protocol;
pub mod provider;
pub mod providers;

pub use protocol::ProtocolError;
pub use provider::{BackendReply, ChatBackend, LLMError, Result};
pub use providers::OpenAIBackend;
