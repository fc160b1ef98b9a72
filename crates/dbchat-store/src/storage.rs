use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use dbchat_core::{decode_transcript, encode_transcript, Message};

use crate::types::{ConversationSummary, StoredConversation};

pub type StoreResult<T> = Result<T, StoreError>;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task join error: {0}")]
    Task(String),

    #[error("time parse error: {0}")]
    Chrono(#[from] chrono::ParseError),

    #[error("failed to encode transcript: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("corrupt transcript for {subject_id}/{conversation_id}: {reason}")]
    CorruptRecord {
        subject_id: String,
        conversation_id: String,
        reason: String,
    },
}

impl StoreError {
    /// The store could not be reached at all, as opposed to holding bad data.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Sqlite(_) | Self::Io(_) | Self::Task(_))
    }
}

/// Durable transcripts keyed by (subject, conversation).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn init(&self) -> StoreResult<()>;

    async fn load(
        &self,
        subject_id: &str,
        conversation_id: &str,
    ) -> StoreResult<Option<StoredConversation>>;

    /// Insert or replace the window and full history for the key in one statement.
    async fn save(
        &self,
        subject_id: &str,
        conversation_id: &str,
        window: &[Message],
        history: &[Message],
    ) -> StoreResult<()>;

    async fn delete(&self, subject_id: &str, conversation_id: &str) -> StoreResult<bool>;

    /// Conversations of `subject_id`, most recently updated first.
    async fn list(&self, subject_id: &str) -> StoreResult<Vec<ConversationSummary>>;
}

#[derive(Debug, Clone)]
pub struct SqliteConversationStore {
    db_path: PathBuf,
}

impl SqliteConversationStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_connection<T, F>(&self, func: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let connection = open_connection(&db_path)?;
            func(&connection)
        })
        .await
        .map_err(|error| StoreError::Task(error.to_string()))?
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn init(&self) -> StoreResult<()> {
        self.with_connection(|connection| {
            connection.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    subject_id TEXT NOT NULL,
                    conversation_id TEXT NOT NULL,
                    messages TEXT NOT NULL,
                    history TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (subject_id, conversation_id)
                );

                CREATE INDEX IF NOT EXISTS idx_conversations_subject_updated
                    ON conversations(subject_id, updated_at);
                "#,
            )?;
            ensure_history_column(connection)
        })
        .await?;
        log::info!("Conversation store ready at {}", self.db_path.display());
        Ok(())
    }

    async fn load(
        &self,
        subject_id: &str,
        conversation_id: &str,
    ) -> StoreResult<Option<StoredConversation>> {
        let subject_id = subject_id.to_string();
        let conversation_id = conversation_id.to_string();

        self.with_connection(move |connection| {
            let raw: Option<(String, String)> = connection
                .query_row(
                    "SELECT messages, history FROM conversations WHERE subject_id = ?1 AND conversation_id = ?2",
                    params![subject_id, conversation_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((raw_window, raw_history)) = raw else {
                return Ok(None);
            };

            let decode = |raw: &str| {
                decode_transcript(raw).map_err(|error| StoreError::CorruptRecord {
                    subject_id: subject_id.clone(),
                    conversation_id: conversation_id.clone(),
                    reason: error.to_string(),
                })
            };
            let window = decode(&raw_window)?;
            let mut history = decode(&raw_history)?;
            if history.is_empty() {
                // Rows written before the history column only carry the window.
                history = window.iter().filter(|m| !m.is_system()).cloned().collect();
            }
            Ok(Some(StoredConversation { window, history }))
        })
        .await
    }

    async fn save(
        &self,
        subject_id: &str,
        conversation_id: &str,
        window: &[Message],
        history: &[Message],
    ) -> StoreResult<()> {
        let subject_id = subject_id.to_string();
        let conversation_id = conversation_id.to_string();
        let messages = encode_transcript(window).map_err(StoreError::Encode)?;
        let history = encode_transcript(history).map_err(StoreError::Encode)?;
        let now = format_timestamp(Utc::now());

        self.with_connection(move |connection| {
            connection.execute(
                r#"
                INSERT INTO conversations (
                    subject_id, conversation_id, messages, history, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                ON CONFLICT(subject_id, conversation_id) DO UPDATE SET
                    messages = excluded.messages,
                    history = excluded.history,
                    updated_at = excluded.updated_at
                "#,
                params![subject_id, conversation_id, messages, history, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, subject_id: &str, conversation_id: &str) -> StoreResult<bool> {
        let subject_id = subject_id.to_string();
        let conversation_id = conversation_id.to_string();

        self.with_connection(move |connection| {
            let deleted = connection.execute(
                "DELETE FROM conversations WHERE subject_id = ?1 AND conversation_id = ?2",
                params![subject_id, conversation_id],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn list(&self, subject_id: &str) -> StoreResult<Vec<ConversationSummary>> {
        let subject_id = subject_id.to_string();

        self.with_connection(move |connection| {
            let mut stmt = connection.prepare(
                r#"
                SELECT conversation_id, json_array_length(history), updated_at
                FROM conversations
                WHERE subject_id = ?1
                ORDER BY updated_at DESC, conversation_id ASC
                "#,
            )?;
            let rows = stmt.query_map(params![subject_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut summaries = Vec::new();
            for row in rows {
                let (conversation_id, message_count, updated_at) = row?;
                summaries.push(ConversationSummary {
                    conversation_id,
                    message_count: usize::try_from(message_count).unwrap_or(0),
                    updated_at: parse_timestamp(updated_at)?,
                });
            }
            Ok(summaries)
        })
        .await
    }
}

fn open_connection(path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

/// Add the `history` column to tables created before it existed.
fn ensure_history_column(connection: &Connection) -> StoreResult<()> {
    let present: i64 = connection.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('conversations') WHERE name = 'history'",
        [],
        |row| row.get(0),
    )?;
    if present == 0 {
        log::info!("Adding history column to conversations table");
        connection.execute_batch(
            "ALTER TABLE conversations ADD COLUMN history TEXT NOT NULL DEFAULT '[]'",
        )?;
    }
    Ok(())
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

fn parse_timestamp(raw: String) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))
}
