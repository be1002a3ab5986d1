// ABOUTME: Test utilities for tablekeep-store, including a key-value store with injectable faults.
// ABOUTME: Used to exercise partial-failure paths (failed meta rewrites, failed deletes) without real I/O errors.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::kv::{KvStore, MemoryKvStore, StoreError};

/// Which operation a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Get,
    Set,
    Delete,
    List,
}

/// An in-memory store that fails chosen operations on chosen keys.
///
/// Faults stay armed until cleared, so retries keep failing.
#[derive(Debug, Default)]
pub struct FaultyKvStore {
    inner: MemoryKvStore,
    faults: Mutex<HashSet<(FaultOp, String)>>,
}

impl FaultyKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail for `key`. For [`FaultOp::List`] the key is ignored.
    pub fn fail(&self, op: FaultOp, key: &str) {
        self.faults().insert((op, key.to_string()));
    }

    pub fn clear_faults(&self) {
        self.faults().clear();
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, HashSet<(FaultOp, String)>> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, op: FaultOp, key: &str) -> Result<(), StoreError> {
        let faults = self.faults();
        let hit = match op {
            FaultOp::List => faults.iter().any(|(o, _)| *o == FaultOp::List),
            _ => faults.contains(&(op, key.to_string())),
        };
        if hit {
            return Err(StoreError::Backend(format!("injected {:?} fault on {}", op, key)));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FaultyKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check(FaultOp::Get, key)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.check(FaultOp::Set, key)?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check(FaultOp::Delete, key)?;
        self.inner.delete(key).await
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        self.check(FaultOp::List, "")?;
        self.inner.list_keys().await
    }
}
