use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dbchat_core::{FunctionExecutionError, SelectedResources};
use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde_json::{Map, Value};

type Result<T> = std::result::Result<T, FunctionExecutionError>;

/// Why the authorizer refused part of a statement.
#[derive(Debug, Clone)]
enum Denial {
    Target(String),
    Operation(String),
}

/// A target database that only ever answers single read-only statements over
/// the selected tables.
#[derive(Debug, Clone)]
pub struct ReadOnlyDatabase {
    path: PathBuf,
    max_rows: usize,
}

impl ReadOnlyDatabase {
    pub fn new(path: impl AsRef<Path>, max_rows: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_rows,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Run `sql` and render at most `max_rows` rows as a JSON array of objects.
    pub async fn query(&self, sql: &str, resources: &SelectedResources) -> Result<String> {
        let path = self.path.clone();
        let sql = sql.to_string();
        let resources = resources.clone();
        let max_rows = self.max_rows;

        tokio::task::spawn_blocking(move || run_query(&path, &sql, resources, max_rows))
            .await
            .map_err(|e| FunctionExecutionError::Execution(format!("query task failed: {e}")))?
    }
}

pub(crate) fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

fn run_query(
    path: &Path,
    sql: &str,
    resources: SelectedResources,
    max_rows: usize,
) -> Result<String> {
    let sql = sql.trim().trim_end_matches(';').trim();
    if sql.is_empty() {
        return Err(FunctionExecutionError::InvalidArguments(
            "query is empty".to_string(),
        ));
    }

    let connection = open_read_only(path).map_err(|e| {
        FunctionExecutionError::Execution(format!("cannot open {}: {e}", path.display()))
    })?;

    let denials = Arc::new(Mutex::new(Vec::new()));
    install_authorizer(&connection, resources, Arc::clone(&denials));

    let mut stmt = connection
        .prepare(sql)
        .map_err(|error| prepare_error(error, &denials))?;

    if !stmt.readonly() {
        return Err(FunctionExecutionError::NotReadOnly(sql.to_string()));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt
        .query([])
        .map_err(|e| FunctionExecutionError::Execution(e.to_string()))?;

    let mut rendered = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| FunctionExecutionError::Execution(e.to_string()))?
    {
        if rendered.len() == max_rows {
            log::debug!("Result truncated at {} rows", max_rows);
            break;
        }
        let mut object = Map::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            let value = row
                .get_ref(index)
                .map_err(|e| FunctionExecutionError::Execution(e.to_string()))?;
            object.insert(column.clone(), to_json(value));
        }
        rendered.push(Value::Object(object));
    }

    log::debug!("Query returned {} row(s)", rendered.len());
    serde_json::to_string(&rendered).map_err(|e| FunctionExecutionError::Execution(e.to_string()))
}

/// Allow plain SELECTs, column reads of selected tables, scalar functions and
/// recursive CTEs. Everything else is denied at prepare time.
fn install_authorizer(
    connection: &Connection,
    resources: SelectedResources,
    denials: Arc<Mutex<Vec<Denial>>>,
) {
    connection.authorizer(Some(move |ctx: AuthContext<'_>| {
        let denial = match ctx.action {
            AuthAction::Select | AuthAction::Function { .. } | AuthAction::Recursive => None,
            AuthAction::Read { table_name, .. } => {
                let database = ctx.database_name.unwrap_or("main");
                if resources.allows(database, table_name) {
                    None
                } else {
                    Some(Denial::Target(format!("{database}.{table_name}")))
                }
            }
            other => Some(Denial::Operation(format!("{other:?}"))),
        };

        match denial {
            None => Authorization::Allow,
            Some(denial) => {
                if let Ok(mut denials) = denials.lock() {
                    denials.push(denial);
                }
                Authorization::Deny
            }
        }
    }));
}

fn prepare_error(error: rusqlite::Error, denials: &Mutex<Vec<Denial>>) -> FunctionExecutionError {
    match error {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::AuthorizationForStatementDenied =>
        {
            let denials = denials.lock().map(|d| d.clone()).unwrap_or_default();
            let mut targets = Vec::new();
            let mut operations = Vec::new();
            for denial in denials {
                match denial {
                    Denial::Target(target) if !targets.contains(&target) => targets.push(target),
                    Denial::Operation(op) => operations.push(op),
                    Denial::Target(_) => {}
                }
            }

            if !targets.is_empty() {
                FunctionExecutionError::ForbiddenTarget(targets.join(", "))
            } else {
                FunctionExecutionError::NotReadOnly(operations.join(", "))
            }
        }
        rusqlite::Error::MultipleStatement => FunctionExecutionError::InvalidArguments(
            "only a single statement is allowed".to_string(),
        ),
        other => FunctionExecutionError::Execution(other.to_string()),
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::String(format!("<blob {} bytes>", blob.len())),
    }
}
