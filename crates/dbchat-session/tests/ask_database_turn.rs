//! End-to-end turns over a real SQLite target and history store

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dbchat_core::budget::WhitespaceTokenCounter;
use dbchat_core::{FunctionSchema, Message, Role, SelectedResources};
use dbchat_llm::{BackendReply, ChatBackend, LLMError};
use dbchat_session::{Durability, SessionConfig, SessionOrchestrator};
use dbchat_sql::{AskDatabaseFunction, ReadOnlyDatabase, SchemaCatalog, ASK_DATABASE};
use dbchat_store::{ConversationStore, SqliteConversationStore};
use tempfile::tempdir;

struct ScriptedBackend {
    replies: Mutex<VecDeque<BackendReply>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<BackendReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(
        &self,
        messages: &[Message],
        _functions: &[FunctionSchema],
    ) -> Result<BackendReply, LLMError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LLMError::Api("script exhausted".to_string()))
    }
}

fn target_db(dir: &Path) -> PathBuf {
    let path = dir.join("target.db");
    let connection = rusqlite::Connection::open(&path).expect("create target");
    connection
        .execute_batch(
            r#"
            CREATE TABLE agents (id INTEGER PRIMARY KEY, name TEXT, seniority TEXT);
            CREATE TABLE payroll (agent_id INTEGER, salary INTEGER);
            INSERT INTO agents (name, seniority) VALUES ('Ayu', 'Senior'), ('Budi', 'Junior');
            INSERT INTO payroll VALUES (1, 9000), (2, 4000);
            "#,
        )
        .expect("populate target");
    path
}

fn invocation(query: &str) -> BackendReply {
    BackendReply::FunctionInvocation {
        name: ASK_DATABASE.to_string(),
        arguments: serde_json::json!({ "query": query }).to_string(),
    }
}

async fn setup(
    dir: &Path,
    replies: Vec<BackendReply>,
) -> (SessionOrchestrator, Arc<ScriptedBackend>, Arc<SqliteConversationStore>) {
    let target = target_db(dir);
    let catalog = Arc::new(SchemaCatalog::load(&target).await.expect("catalog"));
    let executor = Arc::new(AskDatabaseFunction::new(
        ReadOnlyDatabase::new(&target, 50),
        catalog,
    ));
    let store = Arc::new(SqliteConversationStore::new(dir.join("history.db")));
    store.init().await.expect("init store");
    let backend = Arc::new(ScriptedBackend::new(replies));

    let orchestrator = SessionOrchestrator::new(
        store.clone(),
        backend.clone(),
        executor,
        Arc::new(WhitespaceTokenCounter),
        SessionConfig::default().with_system_prompt("You answer questions about agents"),
    );
    (orchestrator, backend, store)
}

#[tokio::test]
async fn query_result_is_narrated_and_persisted() {
    let dir = tempdir().expect("temp dir");
    let (orchestrator, backend, store) = setup(
        dir.path(),
        vec![
            invocation("SELECT COUNT(*) AS seniors FROM main.agents WHERE seniority LIKE '%enior%'"),
            BackendReply::PlainMessage(Message::assistant("One agent is senior.")),
        ],
    )
    .await;
    let resources = SelectedResources::new("main", ["agents"]);
    let functions = orchestrator.function_schemas(&resources);
    let mut conversation = orchestrator.open("alice", "run-1").await.expect("open");

    let outcome = orchestrator
        .submit(&mut conversation, "How many seniors?", &functions, &resources)
        .await
        .expect("turn");

    assert_eq!(outcome.reply.content(), "One agent is senior.");
    assert_eq!(outcome.durability, Durability::Persisted);

    let requests = backend.requests();
    let function_result = requests[1]
        .iter()
        .find(|m| m.role() == Role::Function)
        .expect("function result sent");
    assert_eq!(function_result.content(), r#"[{"seniors":1}]"#);

    let stored = store
        .load("alice", "run-1")
        .await
        .expect("load")
        .expect("record");
    assert_eq!(stored.window, conversation.messages());
    assert_eq!(stored.history, conversation.history());
    assert_eq!(store.list("alice").await.expect("list").len(), 1);
}

#[tokio::test]
async fn unselected_table_never_reaches_the_rows() {
    let dir = tempdir().expect("temp dir");
    let (orchestrator, backend, _store) = setup(
        dir.path(),
        vec![
            invocation("SELECT a.name, p.salary FROM main.agents a JOIN main.payroll p ON p.agent_id = a.id"),
            BackendReply::PlainMessage(Message::assistant("Salaries are not available.")),
        ],
    )
    .await;
    let resources = SelectedResources::new("main", ["agents"]);
    let functions = orchestrator.function_schemas(&resources);
    let mut conversation = orchestrator.open("alice", "run-2").await.expect("open");

    let outcome = orchestrator
        .submit(&mut conversation, "Show salaries", &functions, &resources)
        .await
        .expect("turn");

    assert_eq!(outcome.reply.content(), "Salaries are not available.");
    let requests = backend.requests();
    let function_result = requests[1]
        .iter()
        .find(|m| m.role() == Role::Function)
        .expect("function result sent");
    assert!(function_result.content().contains("main.payroll"));
    assert!(!function_result.content().contains("9000"));
}
