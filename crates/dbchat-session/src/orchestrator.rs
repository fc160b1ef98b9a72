use std::sync::Arc;

use dbchat_core::{
    ConversationWindow, FunctionExecutor, FunctionSchema, Message, SelectedResources,
    SharedTokenCounter, WindowUsage,
};
use dbchat_llm::ChatBackend;
use dbchat_store::{ConversationStore, ConversationSummary};

use crate::bridge::FunctionCallBridge;
use crate::config::SessionConfig;
use crate::conversation::{Conversation, Durability, TurnState};
use crate::error::SessionError;

pub type Result<T> = std::result::Result<T, SessionError>;

/// What one submitted utterance produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub reply: Message,
    /// Messages evicted to make room for the utterance.
    pub evicted: usize,
    pub usage: WindowUsage,
    pub durability: Durability,
}

pub struct SessionOrchestrator {
    store: Arc<dyn ConversationStore>,
    bridge: FunctionCallBridge,
    counter: SharedTokenCounter,
    config: SessionConfig,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        backend: Arc<dyn ChatBackend>,
        executor: Arc<dyn FunctionExecutor>,
        counter: SharedTokenCounter,
        config: SessionConfig,
    ) -> Self {
        let bridge = FunctionCallBridge::new(backend, executor)
            .with_timeout(config.request_timeout)
            .with_narration_instruction(config.narration_instruction.clone())
            .with_result_limit(Arc::clone(&counter), config.max_function_result_tokens);
        Self {
            store,
            bridge,
            counter,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Functions offered to the backend for `resources`.
    pub fn function_schemas(&self, resources: &SelectedResources) -> Vec<FunctionSchema> {
        self.bridge.executor().schemas(resources)
    }

    /// Load a stored conversation, or start one with the greeting.
    ///
    /// An unreachable store yields a memory-only conversation rather than an
    /// error; a record that cannot be decoded is reported.
    pub async fn open(&self, subject_id: &str, conversation_id: &str) -> Result<Conversation> {
        let prefix = format!("[{}/{}]", subject_id, conversation_id);
        let (messages, history, durability) =
            match self.store.load(subject_id, conversation_id).await {
                Ok(Some(record)) => {
                    log::info!(
                        "{} Resumed conversation with {} messages ({} in window)",
                        prefix,
                        record.history.len(),
                        record.window.len()
                    );
                    (record.window, record.history, Durability::Persisted)
                }
                Ok(None) => {
                    log::info!("{} Starting new conversation", prefix);
                    let initial = self.initial_transcript();
                    (initial.clone(), initial, Durability::Persisted)
                }
                Err(error) if error.is_unavailable() => {
                    log::warn!("{} Store unavailable, continuing in memory: {}", prefix, error);
                    let initial = self.initial_transcript();
                    (initial.clone(), initial, Durability::MemoryOnly)
                }
                Err(error) => return Err(SessionError::from(error)),
            };

        let mut window = self.window_with(messages);
        if let Err(error) = window.enforce_budget(0) {
            log::warn!("{} Reloaded transcript exceeds the budget: {}", prefix, error);
        }

        Ok(Conversation::new(
            subject_id,
            conversation_id,
            window,
            history,
            durability,
        ))
    }

    /// Run one user turn: make room, record the utterance, ask the backend and
    /// record the reply.
    ///
    /// Storage failures downgrade durability but never fail the turn.
    pub async fn submit(
        &self,
        conversation: &mut Conversation,
        utterance: &str,
        functions: &[FunctionSchema],
        resources: &SelectedResources,
    ) -> Result<TurnOutcome> {
        if conversation.state == TurnState::AwaitingReply {
            return Err(SessionError::TurnInProgress);
        }
        conversation.state = TurnState::AwaitingReply;

        let outcome = self
            .run_turn(conversation, utterance, functions, resources)
            .await;

        conversation.state = TurnState::Idle;
        outcome
    }

    async fn run_turn(
        &self,
        conversation: &mut Conversation,
        utterance: &str,
        functions: &[FunctionSchema],
        resources: &SelectedResources,
    ) -> Result<TurnOutcome> {
        let prefix = conversation.log_prefix();
        let pending = conversation.window.cost_of(utterance);
        let evicted = conversation.window.enforce_budget(pending)?;
        if !evicted.is_empty() {
            log::debug!("{} Evicted {} message(s)", prefix, evicted.len());
        }

        conversation.record(Message::user(utterance));
        self.persist(conversation).await;

        let request = self.backend_request(&conversation.window);
        log::debug!("{} Sending {} message(s) to backend", prefix, request.len());
        let reply = self.bridge.complete(&request, functions, resources).await?;

        conversation.record(reply.clone());
        self.persist(conversation).await;

        Ok(TurnOutcome {
            reply,
            evicted: evicted.len(),
            usage: conversation.window.usage(),
            durability: conversation.durability,
        })
    }

    /// Delete the stored record and start over from the greeting.
    pub async fn clear(&self, conversation: &mut Conversation) -> Result<()> {
        if conversation.state == TurnState::AwaitingReply {
            return Err(SessionError::TurnInProgress);
        }

        let removed = self
            .store
            .delete(conversation.subject_id(), conversation.conversation_id())
            .await?;
        log::info!(
            "{} Cleared conversation (stored record removed: {})",
            conversation.log_prefix(),
            removed
        );

        conversation.window = self.window_with(self.initial_transcript());
        conversation.history = self.initial_transcript();
        conversation.durability = Durability::Persisted;
        conversation.detached = false;
        Ok(())
    }

    /// The subject's stored conversations, most recent first.
    pub async fn list(&self, subject_id: &str) -> Result<Vec<ConversationSummary>> {
        Ok(self.store.list(subject_id).await?)
    }

    fn initial_transcript(&self) -> Vec<Message> {
        vec![Message::assistant(self.config.greeting.clone())]
    }

    fn window_with(&self, messages: Vec<Message>) -> ConversationWindow {
        let mut window = ConversationWindow::with_messages(
            messages,
            self.config.token_budget,
            self.config.reserve_buffer,
            Arc::clone(&self.counter),
        );
        if let Some(prompt) = &self.config.system_prompt {
            window.pin_system(prompt.clone());
        }
        window
    }

    /// The pinned prompt, then the most recent messages.
    fn backend_request(&self, window: &ConversationWindow) -> Vec<Message> {
        let recent = window.recent(self.config.max_messages_to_backend);
        let mut request = Vec::with_capacity(recent.len() + 1);
        if let Some(pinned) = window.pinned() {
            if recent.len() < window.len() {
                request.push(pinned.clone());
            }
        }
        request.extend_from_slice(recent);
        request
    }

    async fn persist(&self, conversation: &mut Conversation) {
        if conversation.detached {
            return;
        }
        match self
            .store
            .save(
                conversation.subject_id(),
                conversation.conversation_id(),
                conversation.window.messages(),
                &conversation.history,
            )
            .await
        {
            Ok(()) => conversation.durability = Durability::Persisted,
            Err(error) => {
                log::warn!(
                    "{} Failed to persist conversation, keeping it in memory: {}",
                    conversation.log_prefix(),
                    error
                );
                conversation.durability = Durability::MemoryOnly;
            }
        }
    }
}
