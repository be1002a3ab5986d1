// ABOUTME: Persistence layer for tablekeep: durable key-value backends and the table snapshot store.
// ABOUTME: Also hosts the query-history log that shares the same key namespace.

pub mod dir;
pub mod history;
pub mod kv;
pub mod sqlite;
pub mod tables;
pub mod testing;

pub use dir::DirKvStore;
pub use history::{HistoryEntry, QueryHistory};
pub use kv::{KvStore, MemoryKvStore, StoreError};
pub use sqlite::SqliteKvStore;
pub use tables::{ClearReport, PersistenceMeta, StoredTable, TableStore, TableStoreError};
