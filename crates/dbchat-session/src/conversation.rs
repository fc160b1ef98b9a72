use dbchat_core::{ConversationWindow, Message, WindowUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// The last save reached the store.
    Persisted,
    /// The store could not be reached; the transcript lives only in memory.
    MemoryOnly,
}

/// One user's conversation: a budgeted window, the full history behind it,
/// and its turn and storage state.
#[derive(Debug)]
pub struct Conversation {
    subject_id: String,
    conversation_id: String,
    pub(crate) window: ConversationWindow,
    /// Every visible message, evicted ones included. Never holds the system
    /// prompt or function messages.
    pub(crate) history: Vec<Message>,
    pub(crate) state: TurnState,
    pub(crate) durability: Durability,
    /// Opened without reading the stored record; never written back.
    pub(crate) detached: bool,
}

impl Conversation {
    pub(crate) fn new(
        subject_id: impl Into<String>,
        conversation_id: impl Into<String>,
        window: ConversationWindow,
        history: Vec<Message>,
        durability: Durability,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            conversation_id: conversation_id.into(),
            window,
            history,
            state: TurnState::Idle,
            detached: durability == Durability::MemoryOnly,
            durability,
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        self.window.messages()
    }

    /// The full log since the conversation started or was last cleared.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn window(&self) -> &ConversationWindow {
        &self.window
    }

    pub fn usage(&self) -> WindowUsage {
        self.window.usage()
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// Return an interrupted turn (its future was dropped) to idle.
    pub fn abandon_turn(&mut self) {
        if self.state == TurnState::AwaitingReply {
            log::warn!("{} Abandoning interrupted turn", self.log_prefix());
        }
        self.state = TurnState::Idle;
    }

    /// Record a visible message in both the window and the history.
    pub(crate) fn record(&mut self, message: Message) {
        self.history.push(message.clone());
        self.window.append(message);
    }

    pub(crate) fn log_prefix(&self) -> String {
        format!("[{}/{}]", self.subject_id, self.conversation_id)
    }
}
