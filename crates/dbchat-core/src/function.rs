use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON-Schema-like declaration of a function the backend may request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl FunctionSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// The schema and tables the user selected; the only valid query targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedResources {
    schema: String,
    tables: BTreeSet<String>,
}

impl SelectedResources {
    pub fn new<I, S>(schema: impl Into<String>, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: schema.into(),
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// SQL identifiers compare case-insensitively.
    pub fn allows(&self, schema: &str, table: &str) -> bool {
        self.schema.eq_ignore_ascii_case(schema)
            && self.tables.iter().any(|t| t.eq_ignore_ascii_case(table))
    }

    /// Short note sent alongside each request so the backend knows the scope.
    pub fn describe(&self) -> String {
        let tables: Vec<&str> = self.tables().collect();
        format!(
            "Selected schema: {}\nSelected tables: {}",
            self.schema,
            tables.join(", ")
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FunctionExecutionError {
    #[error("Function not allowed: {0}")]
    UnknownFunction(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("No tables selected; select at least one table before querying")]
    NoResourcesSelected,

    #[error("Query targets a table outside the selected set: {0}")]
    ForbiddenTarget(String),

    #[error("Only read-only queries are allowed: {0}")]
    NotReadOnly(String),

    #[error("Execution failed: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, FunctionExecutionError>;

/// Runs allow-listed functions on behalf of the backend.
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    /// Schemas to offer the backend for the given selection.
    fn schemas(&self, resources: &SelectedResources) -> Vec<FunctionSchema>;

    /// Execute `name` with the raw argument JSON, scoped to `resources`.
    async fn execute(
        &self,
        name: &str,
        arguments: &str,
        resources: &SelectedResources,
    ) -> Result<String>;
}

/// Parse raw argument JSON; an empty string means no arguments.
pub fn parse_arguments(raw: &str) -> Result<serde_json::Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(trimmed)
        .map_err(|e| FunctionExecutionError::InvalidArguments(format!("{e}: {trimmed}")))
}
