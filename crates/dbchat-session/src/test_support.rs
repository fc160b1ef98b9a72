//! Hand-written fakes for the backend, function executor and store.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dbchat_core::budget::WhitespaceTokenCounter;
use dbchat_core::{
    FunctionExecutionError, FunctionExecutor, FunctionSchema, Message, SelectedResources,
    SharedTokenCounter,
};
use dbchat_llm::{BackendReply, ChatBackend, LLMError};
use dbchat_store::{
    ConversationStore, ConversationSummary, StoreError, StoreResult, StoredConversation,
};

pub(crate) fn word_counter() -> SharedTokenCounter {
    Arc::new(WhitespaceTokenCounter)
}

pub(crate) fn sales_selection() -> SelectedResources {
    SelectedResources::new("main", ["agents"])
}

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub messages: Vec<Message>,
    pub function_names: Vec<String>,
}

/// Replies from a script, in order, recording every request.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<BackendReply, String>>>,
    seen: Mutex<Vec<SeenRequest>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub(crate) fn new(replies: Vec<Result<BackendReply, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub(crate) fn replying(text: &str) -> Self {
        Self::new(vec![Ok(BackendReply::PlainMessage(Message::assistant(text)))])
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::replying("too late")
        }
    }

    pub(crate) fn push(&self, reply: Result<BackendReply, String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(
        &self,
        messages: &[Message],
        functions: &[FunctionSchema],
    ) -> Result<BackendReply, LLMError> {
        self.seen.lock().unwrap().push(SeenRequest {
            messages: messages.to_vec(),
            function_names: functions.iter().map(|f| f.name.clone()).collect(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
            .map_err(LLMError::Api)
    }
}

/// Offers `ask_database` and answers every call with a fixed result.
pub(crate) struct StaticExecutor {
    result: Result<String, FunctionExecutionError>,
    calls: AtomicUsize,
}

impl StaticExecutor {
    pub(crate) fn new(result: Result<String, FunctionExecutionError>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FunctionExecutor for StaticExecutor {
    fn schemas(&self, _resources: &SelectedResources) -> Vec<FunctionSchema> {
        vec![FunctionSchema::new(
            "ask_database",
            "Run a query",
            serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        )]
    }

    async fn execute(
        &self,
        _name: &str,
        _arguments: &str,
        _resources: &SelectedResources,
    ) -> Result<String, FunctionExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// In-memory store that can be switched offline.
#[derive(Default)]
pub(crate) struct MemoryStore {
    records: Mutex<HashMap<(String, String), StoredConversation>>,
    offline: AtomicBool,
    corrupt: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn set_corrupt(&self, corrupt: bool) {
        self.corrupt.store(corrupt, Ordering::SeqCst);
    }

    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn stored(&self, subject_id: &str, conversation_id: &str) -> Option<StoredConversation> {
        self.records
            .lock()
            .unwrap()
            .get(&(subject_id.to_string(), conversation_id.to_string()))
            .cloned()
    }

    /// The stored window.
    pub(crate) fn record(&self, subject_id: &str, conversation_id: &str) -> Option<Vec<Message>> {
        self.stored(subject_id, conversation_id).map(|r| r.window)
    }

    pub(crate) fn history(&self, subject_id: &str, conversation_id: &str) -> Option<Vec<Message>> {
        self.stored(subject_id, conversation_id).map(|r| r.history)
    }

    /// Seed a record whose history is the window without system messages.
    pub(crate) fn insert(&self, subject_id: &str, conversation_id: &str, messages: Vec<Message>) {
        let history = messages.iter().filter(|m| !m.is_system()).cloned().collect();
        self.put(
            subject_id,
            conversation_id,
            StoredConversation {
                window: messages,
                history,
            },
        );
    }

    fn put(&self, subject_id: &str, conversation_id: &str, record: StoredConversation) {
        self.records
            .lock()
            .unwrap()
            .insert((subject_id.to_string(), conversation_id.to_string()), record);
    }

    fn check(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "store offline",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn init(&self) -> StoreResult<()> {
        self.check()
    }

    async fn load(
        &self,
        subject_id: &str,
        conversation_id: &str,
    ) -> StoreResult<Option<StoredConversation>> {
        self.check()?;
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(StoreError::CorruptRecord {
                subject_id: subject_id.to_string(),
                conversation_id: conversation_id.to_string(),
                reason: "expected value at line 1 column 1".to_string(),
            });
        }
        Ok(self.stored(subject_id, conversation_id))
    }

    async fn save(
        &self,
        subject_id: &str,
        conversation_id: &str,
        window: &[Message],
        history: &[Message],
    ) -> StoreResult<()> {
        self.check()?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.put(
            subject_id,
            conversation_id,
            StoredConversation {
                window: window.to_vec(),
                history: history.to_vec(),
            },
        );
        Ok(())
    }

    async fn delete(&self, subject_id: &str, conversation_id: &str) -> StoreResult<bool> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .remove(&(subject_id.to_string(), conversation_id.to_string()))
            .is_some())
    }

    async fn list(&self, subject_id: &str) -> StoreResult<Vec<ConversationSummary>> {
        self.check()?;
        let records = self.records.lock().unwrap();
        let mut summaries: Vec<ConversationSummary> = records
            .iter()
            .filter(|((subject, _), _)| subject == subject_id)
            .map(|((_, conversation_id), record)| ConversationSummary {
                conversation_id: conversation_id.clone(),
                message_count: record.history.len(),
                updated_at: chrono::Utc::now(),
            })
            .collect();
        summaries.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        Ok(summaries)
    }
}
