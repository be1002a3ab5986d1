// ABOUTME: Defines table schema types (Column, ColumnKind) and the TableSnapshot capture.
// ABOUTME: Rows are positional value vectors aligned with the snapshot's column list.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Value;

/// Longest accepted table name, in bytes.
pub const MAX_TABLE_NAME_LEN: usize = 128;

/// A column as reported by the engine: its name and SQL type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        ColumnKind::from_type_name(&self.data_type)
    }
}

/// How a column's values are typed on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    Integer,
    Float,
    Timestamp,
    Text,
}

impl ColumnKind {
    /// Map an engine SQL type name to a kind. Unknown types decode as text.
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();
        // DECIMAL(18,3) -> DECIMAL
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "BOOLEAN" | "BOOL" | "LOGICAL" => ColumnKind::Boolean,
            "TINYINT" | "SMALLINT" | "INTEGER" | "INT" | "INT1" | "INT2" | "INT4" | "INT8"
            | "BIGINT" | "HUGEINT" | "UTINYINT" | "USMALLINT" | "UINTEGER" | "UBIGINT"
            | "UHUGEINT" | "LONG" | "SHORT" | "SIGNED" => ColumnKind::Integer,
            "DOUBLE" | "FLOAT" | "FLOAT4" | "FLOAT8" | "REAL" | "DECIMAL" | "NUMERIC" => {
                ColumnKind::Float
            }
            "TIMESTAMP" | "TIMESTAMPTZ" | "DATETIME" | "DATE" | "TIMESTAMP WITH TIME ZONE"
            | "TIMESTAMP_MS" | "TIMESTAMP_NS" | "TIMESTAMP_S" => ColumnKind::Timestamp,
            _ => ColumnKind::Text,
        }
    }
}

/// One row, positionally aligned with a column list.
pub type Row = Vec<Value>;

/// Errors raised when validating a table name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableNameError {
    #[error("table name is empty")]
    Empty,

    #[error("table name is longer than {MAX_TABLE_NAME_LEN} bytes")]
    TooLong,

    #[error("table name {0:?} is not a valid identifier")]
    InvalidIdentifier(String),
}

/// Check that `name` is a plain identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_table_name(name: &str) -> Result<(), TableNameError> {
    if name.is_empty() {
        return Err(TableNameError::Empty);
    }
    if name.len() > MAX_TABLE_NAME_LEN {
        return Err(TableNameError::TooLong);
    }
    let mut bytes = name.bytes();
    let head_ok = bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_');
    if !head_ok || !bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(TableNameError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// A schema plus row-data capture of one table at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: u64,
    pub rows: Vec<Row>,
}

impl TableSnapshot {
    /// Build a snapshot whose row_count matches the materialized rows.
    pub fn new(name: impl Into<String>, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            columns,
            row_count: rows.len() as u64,
            rows,
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Iterate one row as (column name, value) pairs.
    pub fn record(&self, index: usize) -> Option<impl Iterator<Item = (&str, &Value)>> {
        self.rows.get(index).map(|row| {
            self.columns
                .iter()
                .map(|c| c.name.as_str())
                .zip(row.iter())
        })
    }
}
