pub mod storage;
pub mod types;

pub use storage::{ConversationStore, SqliteConversationStore, StoreError, StoreResult};
pub use types::{ConversationSummary, StoredConversation};
