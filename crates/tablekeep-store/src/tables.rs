// ABOUTME: Table persistence store mapping table names to serialized snapshots in the durable store.
// ABOUTME: Owns all key naming and the PersistenceMeta entry listing which tables are saved.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tablekeep_core::{CodecError, Column, TableSnapshot, decode_rows, encode_rows};
use thiserror::Error;

use crate::kv::{KvStore, StoreError};

/// Prefix shared by every key this subsystem writes.
pub const NAMESPACE: &str = "tablekeep:";
/// Prefix of per-table snapshot keys. Singleton keys never start with it.
pub const TABLE_KEY_PREFIX: &str = "tablekeep:table:";
/// Singleton key holding [`PersistenceMeta`].
pub const META_KEY: &str = "tablekeep:meta";
/// Singleton key holding the query-history log.
pub const HISTORY_KEY: &str = "tablekeep:history";

/// Durable key for one table's snapshot.
pub fn table_key(name: &str) -> String {
    format!("{}{}", TABLE_KEY_PREFIX, name)
}

/// Errors that can occur in table persistence operations.
#[derive(Debug, Error)]
pub enum TableStoreError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored snapshot for {name} is corrupt: {source}")]
    CorruptSnapshot {
        name: String,
        source: serde_json::Error,
    },

    #[error("persistence meta is corrupt: {0}")]
    CorruptMeta(serde_json::Error),
}

/// Which tables are saved and when the last save happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceMeta {
    pub saved_at: Option<DateTime<Utc>>,
    /// Insertion-ordered and duplicate-free.
    pub table_names: Vec<String>,
}

impl PersistenceMeta {
    pub fn contains(&self, name: &str) -> bool {
        self.table_names.iter().any(|n| n == name)
    }

    fn insert(&mut self, name: &str) {
        if !self.contains(name) {
            self.table_names.push(name.to_string());
        }
    }

    fn remove(&mut self, name: &str) -> bool {
        let before = self.table_names.len();
        self.table_names.retain(|n| n != name);
        before != self.table_names.len()
    }
}

/// The durable form of a table: schema, row count, and CSV interchange text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: u64,
    pub saved_at: DateTime<Utc>,
    pub data: String,
}

impl StoredTable {
    /// Encode a snapshot's rows through the value codec.
    pub fn from_snapshot(snapshot: &TableSnapshot) -> Result<Self, CodecError> {
        Ok(Self {
            name: snapshot.name.clone(),
            columns: snapshot.columns.clone(),
            row_count: snapshot.rows.len() as u64,
            saved_at: Utc::now(),
            data: encode_rows(&snapshot.columns, &snapshot.rows)?,
        })
    }

    /// Decode the stored rows back into a snapshot.
    pub fn to_snapshot(&self) -> Result<TableSnapshot, CodecError> {
        let rows = decode_rows(&self.columns, &self.data)?;
        if rows.len() as u64 != self.row_count {
            tracing::warn!(
                "stored table {} declares {} rows but holds {}",
                self.name,
                self.row_count,
                rows.len()
            );
        }
        Ok(TableSnapshot::new(self.name.clone(), self.columns.clone(), rows))
    }
}

/// Outcome of [`TableStore::clear_all`]. Failed keys were still attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub deleted: Vec<String>,
    pub failures: Vec<(String, String)>,
}

/// Table snapshots and their meta entry on top of any [`KvStore`].
#[derive(Clone)]
pub struct TableStore {
    kv: Arc<dyn KvStore>,
}

impl TableStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// The underlying durable store.
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// Read the meta entry; an absent entry reads as empty.
    pub async fn load_meta(&self) -> Result<PersistenceMeta, TableStoreError> {
        match self.kv.get(META_KEY).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(TableStoreError::CorruptMeta),
            None => Ok(PersistenceMeta::default()),
        }
    }

    async fn write_meta(&self, meta: &PersistenceMeta) -> Result<(), TableStoreError> {
        let bytes = serde_json::to_vec(meta)?;
        self.kv.set(META_KEY, &bytes).await?;
        Ok(())
    }

    /// Write a table's snapshot, then list it in the meta entry.
    pub async fn put(&self, table: &StoredTable) -> Result<(), TableStoreError> {
        let bytes = serde_json::to_vec(table)?;
        self.kv.set(&table_key(&table.name), &bytes).await?;

        let mut meta = self.load_meta().await?;
        meta.insert(&table.name);
        meta.saved_at = Some(table.saved_at);
        self.write_meta(&meta).await?;

        tracing::debug!("stored table {} ({} rows)", table.name, table.row_count);
        Ok(())
    }

    /// Read a table's snapshot; `None` when no data entry exists.
    pub async fn get(&self, name: &str) -> Result<Option<StoredTable>, TableStoreError> {
        let Some(bytes) = self.kv.get(&table_key(name)).await? else {
            return Ok(None);
        };
        let table = serde_json::from_slice(&bytes).map_err(|source| {
            TableStoreError::CorruptSnapshot {
                name: name.to_string(),
                source,
            }
        })?;
        Ok(Some(table))
    }

    /// Delete the data entry, then drop the name from meta. If the second step
    /// fails the meta still lists a table with no data; readers treat that as stale.
    /// Removing an absent table is not an error.
    pub async fn remove(&self, name: &str) -> Result<(), TableStoreError> {
        self.kv.delete(&table_key(name)).await?;

        let mut meta = self.load_meta().await?;
        if meta.remove(name) {
            self.write_meta(&meta).await?;
        }
        tracing::debug!("removed stored table {}", name);
        Ok(())
    }

    /// Names listed in the meta entry, in the order they were first saved.
    pub async fn list_names(&self) -> Result<Vec<String>, TableStoreError> {
        Ok(self.load_meta().await?.table_names)
    }

    /// Meta-listed names whose data entry actually exists. Stale names are
    /// left out without rewriting the meta entry.
    pub async fn list_persisted(&self) -> Result<Vec<String>, TableStoreError> {
        let meta = self.load_meta().await?;
        let keys = self.kv.list_keys().await?;
        Ok(meta
            .table_names
            .into_iter()
            .filter(|name| keys.contains(&table_key(name)))
            .collect())
    }

    /// Drop meta entries whose data key is gone. Returns the dropped names.
    pub async fn prune_stale(&self) -> Result<Vec<String>, TableStoreError> {
        let mut meta = self.load_meta().await?;
        let keys = self.kv.list_keys().await?;

        let mut stale = Vec::new();
        for name in &meta.table_names {
            if !keys.contains(&table_key(name)) {
                stale.push(name.clone());
            }
        }
        if !stale.is_empty() {
            for name in &stale {
                tracing::warn!("dropping stale meta entry for table {}", name);
                meta.remove(name);
            }
            self.write_meta(&meta).await?;
        }
        Ok(stale)
    }

    /// Delete every key in this subsystem's namespace, each independently.
    /// Only a failure to enumerate keys is returned as an error.
    pub async fn clear_all(&self) -> Result<ClearReport, TableStoreError> {
        let keys = self.kv.list_keys().await?;
        let mut report = ClearReport::default();

        for key in keys.into_iter().filter(|k| k.starts_with(NAMESPACE)) {
            match self.kv.delete(&key).await {
                Ok(()) => report.deleted.push(key),
                Err(e) => {
                    tracing::warn!("failed to delete {}: {}", key, e);
                    report.failures.push((key, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}
