use chrono::{DateTime, Utc};
use dbchat_core::Message;
use serde::{Deserialize, Serialize};

/// A conversation as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoredConversation {
    /// Messages still inside the token budget, pinned prompt included.
    pub window: Vec<Message>,
    /// Every visible message since the conversation started or was cleared,
    /// including the ones evicted from the window.
    pub history: Vec<Message>,
}

/// One stored conversation as seen when listing a subject's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub conversation_id: String,
    /// Length of the full history
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}
