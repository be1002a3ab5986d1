// ABOUTME: Registry synchronization for tablekeep: the engine collaborator and the synchronizer that drives it.
// ABOUTME: Connects live engine tables to the table store, the archive codec, and the notification channel.

pub mod engine;
pub mod error;
pub mod memory;
pub mod synchronizer;

pub use engine::{Engine, EngineError};
pub use error::SyncError;
pub use memory::MemoryEngine;
pub use synchronizer::{
    ExportedArchive, ImportReport, LiveTable, RegistrySynchronizer, RegistryView, RestoreReport,
    SaveAllReport, SaveOutcome, TableStatus,
};
