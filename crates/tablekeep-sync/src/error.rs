// ABOUTME: Error taxonomy for registry synchronization operations.
// ABOUTME: Lower-layer errors convert into exactly one of the five synchronizer error kinds.

use tablekeep_core::{ArchiveError, CodecError};
use tablekeep_store::TableStoreError;
use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("archive format error: {0}")]
    ArchiveFormat(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] CodecError),

    #[error("store io error: {0}")]
    StoreIo(#[from] TableStoreError),

    #[error("engine io error: {0}")]
    EngineIo(#[from] EngineError),
}

impl From<ArchiveError> for SyncError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::Format(msg) => SyncError::ArchiveFormat(msg),
            other => SyncError::ArchiveFormat(other.to_string()),
        }
    }
}
