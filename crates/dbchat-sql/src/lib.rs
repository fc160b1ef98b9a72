//! Read-only access to the target database.
//!
//! - `database` - restricted statement execution (authorizer + read-only handle)
//! - `catalog` - schema introspection and table contexts
//! - `function` - the `ask_database` function offered to the backend
//! - `prompt` - system prompt for a table selection

pub mod catalog;
pub mod database;
pub mod function;
pub mod prompt;

pub use catalog::{CatalogError, ColumnInfo, SchemaCatalog, TableInfo};
pub use database::ReadOnlyDatabase;
pub use function::{AskDatabaseFunction, ASK_DATABASE};
pub use prompt::system_prompt;
