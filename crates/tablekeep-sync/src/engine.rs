// ABOUTME: Engine collaborator trait: the analytical engine's live table registry as seen by the synchronizer.
// ABOUTME: Implementations run queries over in-memory tables and accept registered virtual files.

use async_trait::async_trait;
use tablekeep_core::{Column, Row};
use thiserror::Error;

/// Errors reported by an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("query on {table} failed: {reason}")]
    Query { table: String, reason: String },

    #[error("creating table {table} failed: {reason}")]
    Create { table: String, reason: String },
}

/// The live side of the registry.
///
/// Rows returned by [`Engine::query_rows`] are positional and follow the
/// column order of [`Engine::describe_table`].
#[async_trait]
pub trait Engine: Send + Sync {
    /// Names of all live tables.
    async fn list_live_tables(&self) -> Result<Vec<String>, EngineError>;

    async fn describe_table(&self, name: &str) -> Result<Vec<Column>, EngineError>;

    async fn row_count(&self, name: &str) -> Result<u64, EngineError>;

    async fn query_rows(&self, name: &str) -> Result<Vec<Row>, EngineError>;

    /// Create (or replace) a live table: schema first, then the rows.
    async fn create_table_from_rows(
        &self,
        name: &str,
        columns: &[Column],
        rows: Vec<Row>,
    ) -> Result<(), EngineError>;

    /// Make a byte buffer readable by the engine under `file_name`.
    async fn register_virtual_file(&self, file_name: &str, bytes: Vec<u8>)
    -> Result<(), EngineError>;
}
