use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dbchat_core::SelectedResources;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::open_read_only;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("catalog task join error: {0}")]
    Task(String),

    #[error("unknown schema '{0}'")]
    UnknownSchema(String),

    #[error("unknown table '{schema}.{table}'")]
    UnknownTable { schema: String, table: String },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Column listing handed to the backend so it can write SQL for this table.
    pub fn context(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|column| format!("- **{}**: {}", column.name, column.data_type))
            .collect();
        format!(
            "Table: {}\nColumns:\n{}",
            self.qualified_name(),
            columns.join("\n")
        )
    }
}

/// Tables and columns of every schema in the target database.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, Vec<TableInfo>>,
}

impl SchemaCatalog {
    pub async fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let catalog = tokio::task::spawn_blocking(move || {
            let connection = open_read_only(&path)?;
            Self::from_connection(&connection)
        })
        .await
        .map_err(|e| CatalogError::Task(e.to_string()))??;

        log::info!(
            "Loaded catalog: {} schema(s), {} table(s)",
            catalog.schemas.len(),
            catalog.schemas.values().map(Vec::len).sum::<usize>()
        );
        Ok(catalog)
    }

    pub fn from_connection(connection: &Connection) -> CatalogResult<Self> {
        let mut schemas = BTreeMap::new();
        for schema in database_names(connection)? {
            let mut tables = Vec::new();
            for name in table_names(connection, &schema)? {
                let columns = table_columns(connection, &schema, &name)?;
                tables.push(TableInfo {
                    schema: schema.clone(),
                    name,
                    columns,
                });
            }
            schemas.insert(schema, tables);
        }
        Ok(Self { schemas })
    }

    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn tables(&self, schema: &str) -> CatalogResult<&[TableInfo]> {
        self.schemas
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(schema))
            .map(|(_, tables)| tables.as_slice())
            .ok_or_else(|| CatalogError::UnknownSchema(schema.to_string()))
    }

    pub fn table(&self, schema: &str, table: &str) -> Option<&TableInfo> {
        self.tables(schema)
            .ok()?
            .iter()
            .find(|info| info.name.eq_ignore_ascii_case(table))
    }

    /// Check a user's selection against the catalog, returning it with the
    /// catalog's spelling of each name.
    pub fn resolve<I, S>(&self, schema: &str, tables: I) -> CatalogResult<SelectedResources>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known = self.tables(schema)?;
        let canonical_schema = known
            .first()
            .map(|t| t.schema.clone())
            .unwrap_or_else(|| schema.to_string());

        let mut resolved = Vec::new();
        for table in tables {
            let table = table.as_ref();
            let info = self
                .table(schema, table)
                .ok_or_else(|| CatalogError::UnknownTable {
                    schema: schema.to_string(),
                    table: table.to_string(),
                })?;
            resolved.push(info.name.clone());
        }
        Ok(SelectedResources::new(canonical_schema, resolved))
    }

    /// Contexts of the selected tables, separated by blank lines.
    pub fn table_contexts(&self, resources: &SelectedResources) -> String {
        resources
            .tables()
            .filter_map(|table| self.table(resources.schema(), table))
            .map(TableInfo::context)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn database_names(connection: &Connection) -> CatalogResult<Vec<String>> {
    let mut stmt = connection.prepare("PRAGMA database_list")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names.into_iter().filter(|name| name != "temp").collect())
}

fn table_names(connection: &Connection, schema: &str) -> CatalogResult<Vec<String>> {
    let sql = format!(
        "SELECT name FROM {}.sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
        quote_identifier(schema)
    );
    let mut stmt = connection.prepare(&sql)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn table_columns(connection: &Connection, schema: &str, table: &str) -> CatalogResult<Vec<ColumnInfo>> {
    let sql = format!(
        "PRAGMA {}.table_info({})",
        quote_identifier(schema),
        quote_identifier(table)
    );
    let mut stmt = connection.prepare(&sql)?;
    let columns = stmt
        .query_map([], |row| {
            let data_type: String = row.get(2)?;
            Ok(ColumnInfo {
                name: row.get(1)?,
                data_type: if data_type.is_empty() {
                    "ANY".to_string()
                } else {
                    data_type
                },
                primary_key: row.get::<_, i64>(5)? > 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}
