use std::sync::Arc;

use async_trait::async_trait;
use dbchat_core::{
    parse_arguments, FunctionExecutionError, FunctionExecutor, FunctionSchema, SelectedResources,
};
use serde_json::json;

use crate::catalog::SchemaCatalog;
use crate::database::ReadOnlyDatabase;

pub const ASK_DATABASE: &str = "ask_database";

/// The one function offered to the backend: run a read-only query over the
/// selected tables.
pub struct AskDatabaseFunction {
    database: ReadOnlyDatabase,
    catalog: Arc<SchemaCatalog>,
}

impl AskDatabaseFunction {
    pub fn new(database: ReadOnlyDatabase, catalog: Arc<SchemaCatalog>) -> Self {
        Self { database, catalog }
    }

    pub fn schema(&self, resources: &SelectedResources) -> FunctionSchema {
        let tables = if resources.is_empty() {
            "(no tables selected)".to_string()
        } else {
            self.catalog.table_contexts(resources)
        };

        FunctionSchema::new(
            ASK_DATABASE,
            "Use this function to answer user questions about the database. Input must be a complete SQL query.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": format!(
                            "SQLite query extracting the information that answers the user's question. \
                             Write it against this schema:\n{tables}\n\
                             Return the query as plain SQL text, not JSON, on a single line."
                        )
                    }
                },
                "required": ["query"]
            }),
        )
    }
}

#[async_trait]
impl FunctionExecutor for AskDatabaseFunction {
    fn schemas(&self, resources: &SelectedResources) -> Vec<FunctionSchema> {
        vec![self.schema(resources)]
    }

    async fn execute(
        &self,
        name: &str,
        arguments: &str,
        resources: &SelectedResources,
    ) -> Result<String, FunctionExecutionError> {
        if name != ASK_DATABASE {
            return Err(FunctionExecutionError::UnknownFunction(name.to_string()));
        }
        if resources.is_empty() {
            return Err(FunctionExecutionError::NoResourcesSelected);
        }

        let args = parse_arguments(arguments)?;
        let query = args["query"].as_str().ok_or_else(|| {
            FunctionExecutionError::InvalidArguments("Missing 'query' parameter".to_string())
        })?;

        log::info!("Running query: {}", query);
        self.database.query(query, resources).await
    }
}
