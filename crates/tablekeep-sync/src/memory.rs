// ABOUTME: In-memory engine holding live tables as snapshots, used by the CLI and in tests.
// ABOUTME: Supports injected query/create failures and counts create calls for assertions.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tablekeep_core::{Column, Row, TableSnapshot};

use crate::engine::{Engine, EngineError};

#[derive(Default)]
struct EngineInner {
    /// Live tables in creation order.
    tables: Vec<TableSnapshot>,
    files: BTreeMap<String, Vec<u8>>,
    failing_queries: HashSet<String>,
    failing_creates: HashSet<String>,
    create_calls: usize,
}

/// A process-lifetime engine whose tables are plain snapshots.
#[derive(Default)]
pub struct MemoryEngine {
    inner: Mutex<EngineInner>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add or replace a live table directly, bypassing the create path.
    pub fn insert_table(&self, snapshot: TableSnapshot) {
        let mut inner = self.lock();
        match inner.tables.iter_mut().find(|t| t.name == snapshot.name) {
            Some(existing) => *existing = snapshot,
            None => inner.tables.push(snapshot),
        }
    }

    /// Drop a live table. Returns false if it was not live.
    pub fn drop_table(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.tables.len();
        inner.tables.retain(|t| t.name != name);
        before != inner.tables.len()
    }

    pub fn table(&self, name: &str) -> Option<TableSnapshot> {
        self.lock().tables.iter().find(|t| t.name == name).cloned()
    }

    pub fn virtual_file(&self, file_name: &str) -> Option<Vec<u8>> {
        self.lock().files.get(file_name).cloned()
    }

    /// Make every row query against `name` fail.
    pub fn fail_queries_for(&self, name: &str) {
        self.lock().failing_queries.insert(name.to_string());
    }

    /// Make every create of `name` fail.
    pub fn fail_creates_for(&self, name: &str) {
        self.lock().failing_creates.insert(name.to_string());
    }

    /// Number of `create_table_from_rows` calls, successful or not.
    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }
}

fn find<'a>(inner: &'a EngineInner, name: &str) -> Result<&'a TableSnapshot, EngineError> {
    inner
        .tables
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| EngineError::TableNotFound(name.to_string()))
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn list_live_tables(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.lock().tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn describe_table(&self, name: &str) -> Result<Vec<Column>, EngineError> {
        Ok(find(&self.lock(), name)?.columns.clone())
    }

    async fn row_count(&self, name: &str) -> Result<u64, EngineError> {
        Ok(find(&self.lock(), name)?.rows.len() as u64)
    }

    async fn query_rows(&self, name: &str) -> Result<Vec<Row>, EngineError> {
        let inner = self.lock();
        if inner.failing_queries.contains(name) {
            return Err(EngineError::Query {
                table: name.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(find(&inner, name)?.rows.clone())
    }

    async fn create_table_from_rows(
        &self,
        name: &str,
        columns: &[Column],
        rows: Vec<Row>,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.create_calls += 1;

        if inner.failing_creates.contains(name) {
            return Err(EngineError::Create {
                table: name.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        if columns.is_empty() {
            return Err(EngineError::Create {
                table: name.to_string(),
                reason: "no columns".to_string(),
            });
        }
        if let Some(row) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(EngineError::Create {
                table: name.to_string(),
                reason: format!("row has {} values for {} columns", row.len(), columns.len()),
            });
        }

        let snapshot = TableSnapshot::new(name, columns.to_vec(), rows);
        match inner.tables.iter_mut().find(|t| t.name == name) {
            Some(existing) => *existing = snapshot,
            None => inner.tables.push(snapshot),
        }
        Ok(())
    }

    async fn register_virtual_file(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), EngineError> {
        self.lock().files.insert(file_name.to_string(), bytes);
        Ok(())
    }
}
