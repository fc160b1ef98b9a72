use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use dbchat_core::{build_counter, AppConfig, FunctionSchema, Message, SelectedResources};
use dbchat_llm::{BackendReply, ChatBackend, LLMError, OpenAIBackend};
use dbchat_session::{SessionConfig, SessionOrchestrator};
use dbchat_sql::{system_prompt, AskDatabaseFunction, ReadOnlyDatabase, SchemaCatalog};
use dbchat_store::{ConversationStore, SqliteConversationStore};

/// Everything a command needs, wired from configuration.
pub struct App {
    pub orchestrator: SessionOrchestrator,
    pub catalog: Arc<SchemaCatalog>,
    pub resources: SelectedResources,
}

/// Whether the command talks to the backend and the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Chat,
    Maintenance,
}

impl App {
    pub async fn build(
        config: &AppConfig,
        schema: &str,
        tables: &[String],
        mode: Mode,
    ) -> anyhow::Result<Self> {
        let counter = build_counter(config.token_counter, &config.model)
            .context("failed to initialize token counter")?;

        let catalog = match SchemaCatalog::load(&config.target_db).await {
            Ok(catalog) => Arc::new(catalog),
            Err(error) if mode == Mode::Maintenance => {
                log::warn!("Target database unavailable: {}", error);
                Arc::new(SchemaCatalog::default())
            }
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("failed to read target database {}", config.target_db.display())
                })
            }
        };

        let resources = if mode == Mode::Chat {
            catalog
                .resolve(schema, tables)
                .context("invalid table selection")?
        } else {
            SelectedResources::new(schema, tables.iter().cloned())
        };

        let store = Arc::new(SqliteConversationStore::new(&config.history_db));
        if let Err(error) = store.init().await {
            log::warn!(
                "History store {} unavailable, conversations stay in memory: {}",
                config.history_db.display(),
                error
            );
        }

        let backend: Arc<dyn ChatBackend> = match OpenAIBackend::from_config(config) {
            Ok(backend) => Arc::new(backend),
            Err(error) if mode == Mode::Maintenance => {
                log::debug!("Backend not configured: {}", error);
                Arc::new(MissingCredentials)
            }
            Err(error) => return Err(error).context("backend is not configured"),
        };

        let executor = Arc::new(AskDatabaseFunction::new(
            ReadOnlyDatabase::new(&config.target_db, config.max_result_rows),
            Arc::clone(&catalog),
        ));

        let database_name = config
            .target_db
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database".to_string());
        let session_config = SessionConfig::from_app_config(config)
            .with_system_prompt(system_prompt(&database_name, &resources, &catalog));

        let orchestrator =
            SessionOrchestrator::new(store, backend, executor, counter, session_config);

        Ok(Self {
            orchestrator,
            catalog,
            resources,
        })
    }

    pub fn functions(&self) -> Vec<FunctionSchema> {
        self.orchestrator.function_schemas(&self.resources)
    }
}

/// Backend for maintenance commands when no API key is configured.
struct MissingCredentials;

#[async_trait]
impl ChatBackend for MissingCredentials {
    async fn complete(
        &self,
        _messages: &[Message],
        _functions: &[FunctionSchema],
    ) -> Result<BackendReply, LLMError> {
        Err(LLMError::Auth(
            "no API key configured (set OPENAI_API_KEY)".to_string(),
        ))
    }
}
