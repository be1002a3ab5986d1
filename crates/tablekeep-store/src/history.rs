// ABOUTME: Capped query-history log kept under the singleton history key of the durable store.
// ABOUTME: Entries are appended oldest-first on disk and listed newest-first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kv::KvStore;
use crate::tables::{HISTORY_KEY, TableStoreError};

/// Default number of entries retained.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// One executed query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub query: String,
    pub executed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl HistoryEntry {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            executed_at: Utc::now(),
            duration_ms: None,
            row_count: None,
        }
    }
}

/// Append-only query log with a retention cap.
#[derive(Clone)]
pub struct QueryHistory {
    kv: Arc<dyn KvStore>,
    limit: usize,
}

impl QueryHistory {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_limit(kv, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(kv: Arc<dyn KvStore>, limit: usize) -> Self {
        Self { kv, limit }
    }

    async fn load(&self) -> Result<Vec<HistoryEntry>, TableStoreError> {
        match self.kv.get(HISTORY_KEY).await? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    tracing::warn!("query history is unreadable, starting fresh: {}", e);
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    /// Record a query, dropping the oldest entries beyond the cap.
    pub async fn append(&self, entry: HistoryEntry) -> Result<(), TableStoreError> {
        let mut entries = self.load().await?;
        entries.push(entry);
        if entries.len() > self.limit {
            let excess = entries.len() - self.limit;
            entries.drain(..excess);
        }
        self.kv.set(HISTORY_KEY, &serde_json::to_vec(&entries)?).await?;
        Ok(())
    }

    /// Entries newest first.
    pub async fn list(&self) -> Result<Vec<HistoryEntry>, TableStoreError> {
        let mut entries = self.load().await?;
        entries.reverse();
        Ok(entries)
    }

    pub async fn clear(&self) -> Result<(), TableStoreError> {
        self.kv.delete(HISTORY_KEY).await?;
        Ok(())
    }
}
