// ABOUTME: Registry synchronizer reconciling the engine's live tables with durable snapshots and archives.
// ABOUTME: Batch operations run table by table, accumulate per-table failures, and report through notifications.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::Arc;

use tablekeep_core::archive::data_entry_name;
use tablekeep_core::risk::group_thousands;
use tablekeep_core::{
    ArchivedTable, Column, MissingEntryPolicy, NewNotification, NotificationCenter,
    NotificationKind, NotificationUpdate, RiskLevel, RiskThresholds, RiskWarning, TableFailure,
    TableSnapshot, build_archive, parse_archive,
};
use tablekeep_store::{ClearReport, StoredTable, TableStore};
use ulid::Ulid;

use crate::engine::Engine;
use crate::error::SyncError;

/// Result of saving one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub row_count: u64,
    pub warning: Option<RiskWarning>,
}

/// Result of a batch save. Every requested name lands in `saved` or `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveAllReport {
    pub saved: Vec<String>,
    pub errors: Vec<TableFailure>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored_count: usize,
    pub table_names: Vec<String>,
    /// Saved tables that were missing, corrupt, or rejected by the engine.
    pub skipped: Vec<TableFailure>,
}

#[derive(Debug, Clone)]
pub struct ExportedArchive {
    pub bytes: Vec<u8>,
    /// Tables written to the archive, in request order.
    pub tables: Vec<String>,
    pub errors: Vec<TableFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported_count: usize,
    /// Tables listed in the manifest.
    pub total_count: usize,
    pub table_names: Vec<String>,
    pub errors: Vec<TableFailure>,
}

/// Persistence state of one table name, combining the live registry and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Absent,
    LiveOnly,
    /// A save started and has not finished. A save whose future was dropped
    /// stays here until the table is saved or removed again.
    Saving,
    Persisted,
    /// Durable copy remains but the table is no longer live.
    Stale,
}

/// One live table as shown by [`RegistrySynchronizer::refresh`].
#[derive(Debug, Clone, PartialEq)]
pub struct LiveTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub row_count: u64,
    pub risk: RiskLevel,
    pub status: TableStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryView {
    pub tables: Vec<LiveTable>,
    /// Persisted tables that are not live.
    pub stale: Vec<String>,
}

fn failure(name: &str, detail: impl Display) -> TableFailure {
    TableFailure {
        name: name.to_string(),
        error_detail: detail.to_string(),
    }
}

/// Keeps the engine's live tables and the durable store in step for one session.
///
/// Mutating operations take `&mut self`, so writes to the store and the live
/// namespace never interleave.
pub struct RegistrySynchronizer {
    engine: Arc<dyn Engine>,
    store: TableStore,
    notifications: NotificationCenter,
    thresholds: RiskThresholds,
    missing_entries: MissingEntryPolicy,
    saving: BTreeSet<String>,
}

impl RegistrySynchronizer {
    pub fn new(engine: Arc<dyn Engine>, store: TableStore, notifications: NotificationCenter) -> Self {
        Self {
            engine,
            store,
            notifications,
            thresholds: RiskThresholds::default(),
            missing_entries: MissingEntryPolicy::default(),
            saving: BTreeSet::new(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_missing_entry_policy(mut self, policy: MissingEntryPolicy) -> Self {
        self.missing_entries = policy;
        self
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    /// Persist one live table. Fails with [`SyncError::TableNotFound`] if it is not live.
    pub async fn save_table(&mut self, name: &str) -> Result<SaveOutcome, SyncError> {
        let id = self.notifications.start(
            NotificationKind::InProgress,
            format!("Saving \"{}\"", name),
            None,
        );
        let result = self.persist_table(name).await;
        match &result {
            Ok(outcome) => self.finish_ok(
                id,
                format!("Saved {} rows", group_thousands(outcome.row_count)),
            ),
            Err(e) => self.finish_err(id, e),
        }
        result
    }

    /// Persist each named table in order. One table's failure never stops the rest.
    pub async fn save_all(&mut self, names: &[String]) -> SaveAllReport {
        let id = self.notifications.start(
            NotificationKind::InProgress,
            format!("Saving {} tables", names.len()),
            None,
        );

        let mut report = SaveAllReport::default();
        for name in names {
            match self.persist_table(name).await {
                Ok(outcome) => {
                    report.saved.push(name.clone());
                    if let Some(warning) = outcome.warning {
                        report.warnings.push(warning.message);
                    }
                }
                Err(e) => report.errors.push(failure(name, e)),
            }
        }

        self.report_failures("save", &report.errors);
        self.finish_ok(
            id,
            format!("Saved {}/{} tables", report.saved.len(), names.len()),
        );
        tracing::info!(
            "saved {}/{} tables ({} failed)",
            report.saved.len(),
            names.len(),
            report.errors.len()
        );
        report
    }

    /// Persist every live table.
    pub async fn save_all_live(&mut self) -> Result<SaveAllReport, SyncError> {
        let names = self.engine.list_live_tables().await?;
        Ok(self.save_all(&names).await)
    }

    /// Recreate every saved table in the engine. Missing or corrupt snapshots
    /// are skipped; stale meta entries are pruned.
    pub async fn restore_all(&mut self) -> Result<RestoreReport, SyncError> {
        let id = self.notifications.start(
            NotificationKind::InProgress,
            "Restoring saved tables",
            None,
        );
        let result = self.restore_saved().await;
        match &result {
            Ok(report) => {
                self.report_failures("restore", &report.skipped);
                let total = report.restored_count + report.skipped.len();
                self.finish_ok(
                    id,
                    format!("Restored {}/{} tables", report.restored_count, total),
                );
            }
            Err(e) => self.finish_err(id, e),
        }
        result
    }

    /// Startup restore. Never fails: on error the live registry is left as it was.
    pub async fn auto_restore(&mut self) -> RestoreReport {
        match self.restore_all().await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("auto-restore failed, starting with no saved tables: {}", e);
                RestoreReport::default()
            }
        }
    }

    /// Remove a table's durable copy. The live table, if any, is untouched.
    /// Removing a table that was never saved succeeds.
    pub async fn remove_table(&mut self, name: &str) -> Result<(), SyncError> {
        self.saving.remove(name);
        self.store.remove(name).await?;
        tracing::info!("removed saved copy of {}", name);
        Ok(())
    }

    /// Delete every durable entry this subsystem owns.
    pub async fn clear_all(&mut self) -> Result<ClearReport, SyncError> {
        self.saving.clear();
        let report = self.store.clear_all().await?;

        for (key, detail) in &report.failures {
            self.notifications
                .error(format!("Could not delete \"{}\"", key), detail.clone());
        }
        self.notifications.success(
            "Cleared saved data",
            format!("Deleted {} entries", report.deleted.len()),
        );
        tracing::info!(
            "cleared {} entries ({} failed)",
            report.deleted.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Bundle the named live tables into an archive. Tables that are not live
    /// or cannot be read or encoded are left out and reported, as are repeats
    /// of a name already requested.
    pub async fn export_archive(&self, names: &[String]) -> Result<ExportedArchive, SyncError> {
        let id = self.notifications.start(
            NotificationKind::InProgress,
            format!("Exporting {} tables", names.len()),
            None,
        );

        let live = match self.engine.list_live_tables().await {
            Ok(live) => live,
            Err(e) => {
                let e = SyncError::from(e);
                self.finish_err(id, &e);
                return Err(e);
            }
        };

        let mut snapshots = Vec::with_capacity(names.len());
        let mut errors = Vec::new();
        let mut seen = BTreeSet::new();
        for name in names {
            if !seen.insert(name.as_str()) {
                errors.push(failure(name, "table was requested more than once"));
                continue;
            }
            if !live.contains(name) {
                errors.push(failure(name, SyncError::TableNotFound(name.clone())));
                continue;
            }
            match self.read_snapshot(name).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => errors.push(failure(name, e)),
            }
        }

        let built = match build_archive(&snapshots) {
            Ok(built) => built,
            Err(e) => {
                let e = SyncError::from(e);
                self.finish_err(id, &e);
                return Err(e);
            }
        };
        errors.extend(built.failures);

        self.report_failures("export", &errors);
        self.finish_ok(
            id,
            format!("Exported {}/{} tables", built.included.len(), names.len()),
        );
        tracing::info!(
            "exported {}/{} tables ({} bytes)",
            built.included.len(),
            names.len(),
            built.bytes.len()
        );

        Ok(ExportedArchive {
            bytes: built.bytes,
            tables: built.included,
            errors,
        })
    }

    /// Create live tables from an archive. A structurally invalid archive is
    /// rejected before any table is created.
    pub async fn import_archive(&mut self, bytes: &[u8]) -> Result<ImportReport, SyncError> {
        let id = self
            .notifications
            .start(NotificationKind::InProgress, "Importing archive", None);

        let parsed = match parse_archive(bytes, self.missing_entries) {
            Ok(parsed) => parsed,
            Err(e) => {
                let e = SyncError::from(e);
                tracing::warn!("rejected archive: {}", e);
                self.finish_err(id, &e);
                return Err(e);
            }
        };

        let mut report = ImportReport {
            total_count: parsed.manifest.tables.len(),
            errors: parsed.skipped.clone(),
            ..ImportReport::default()
        };
        for table in &parsed.tables {
            let name = &table.descriptor.name;
            match self.create_from_archive(table).await {
                Ok(()) => report.table_names.push(name.clone()),
                Err(e) => report.errors.push(failure(name, e)),
            }
        }
        report.imported_count = report.table_names.len();

        self.report_failures("import", &report.errors);
        self.finish_ok(
            id,
            format!(
                "Imported {}/{} tables",
                report.imported_count, report.total_count
            ),
        );
        tracing::info!(
            "imported {}/{} tables",
            report.imported_count,
            report.total_count
        );
        Ok(report)
    }

    /// Current live tables with their persistence status, plus stale saved names.
    pub async fn refresh(&self) -> Result<RegistryView, SyncError> {
        let live = self.engine.list_live_tables().await?;
        let persisted = self.store.list_persisted().await?;

        let mut view = RegistryView::default();
        for name in &live {
            let columns = self.engine.describe_table(name).await?;
            let row_count = self.engine.row_count(name).await?;
            view.tables.push(LiveTable {
                name: name.clone(),
                columns,
                row_count,
                risk: self.thresholds.level(row_count),
                status: self.classify_status(name, true, persisted.contains(name)),
            });
        }
        view.stale = persisted
            .into_iter()
            .filter(|name| !live.contains(name))
            .collect();
        Ok(view)
    }

    pub async fn status(&self, name: &str) -> Result<TableStatus, SyncError> {
        let live = self.engine.list_live_tables().await?;
        let persisted = self.store.list_persisted().await?;
        Ok(self.classify_status(
            name,
            live.iter().any(|n| n == name),
            persisted.iter().any(|n| n == name),
        ))
    }

    fn classify_status(&self, name: &str, live: bool, persisted: bool) -> TableStatus {
        if self.saving.contains(name) {
            return TableStatus::Saving;
        }
        match (live, persisted) {
            (true, true) => TableStatus::Persisted,
            (true, false) => TableStatus::LiveOnly,
            (false, true) => TableStatus::Stale,
            (false, false) => TableStatus::Absent,
        }
    }

    async fn persist_table(&mut self, name: &str) -> Result<SaveOutcome, SyncError> {
        let live = self.engine.list_live_tables().await?;
        if !live.iter().any(|n| n == name) {
            return Err(SyncError::TableNotFound(name.to_string()));
        }

        self.saving.insert(name.to_string());
        let result = self.write_snapshot(name).await;
        self.saving.remove(name);
        result
    }

    async fn write_snapshot(&self, name: &str) -> Result<SaveOutcome, SyncError> {
        let row_count = self.engine.row_count(name).await?;
        let warning = self.thresholds.classify(name, row_count);
        if let Some(w) = &warning {
            tracing::warn!("{}", w.message);
            self.notifications.push(
                NewNotification::new(NotificationKind::Info, "Large table")
                    .message(w.message.clone())
                    .auto_close(w.level != RiskLevel::Strong),
            );
        }

        let snapshot = self.read_snapshot(name).await?;
        let stored = StoredTable::from_snapshot(&snapshot)?;
        self.store.put(&stored).await?;

        tracing::info!("saved table {} ({} rows)", name, stored.row_count);
        Ok(SaveOutcome {
            row_count: stored.row_count,
            warning,
        })
    }

    async fn read_snapshot(&self, name: &str) -> Result<TableSnapshot, SyncError> {
        let columns = self.engine.describe_table(name).await?;
        let rows = self.engine.query_rows(name).await?;
        Ok(TableSnapshot::new(name, columns, rows))
    }

    async fn restore_saved(&mut self) -> Result<RestoreReport, SyncError> {
        let mut report = RestoreReport::default();

        for name in self.store.prune_stale().await? {
            tracing::warn!("saved table {} has no data, dropped from the registry", name);
            report.skipped.push(failure(&name, "saved data is missing"));
        }

        for name in self.store.list_names().await? {
            let stored = match self.store.get(&name).await {
                Ok(Some(stored)) => stored,
                Ok(None) => {
                    tracing::warn!("skipping saved table {}: no data", name);
                    report.skipped.push(failure(&name, "saved data is missing"));
                    continue;
                }
                Err(e) => {
                    tracing::warn!("skipping saved table {}: {}", name, e);
                    report.skipped.push(failure(&name, e));
                    continue;
                }
            };

            match self.recreate(&name, &stored).await {
                Ok(()) => report.table_names.push(name),
                Err(e) => {
                    tracing::warn!("skipping saved table {}: {}", name, e);
                    report.skipped.push(failure(&name, e));
                }
            }
        }

        report.restored_count = report.table_names.len();
        tracing::info!(
            "restored {} tables ({} skipped)",
            report.restored_count,
            report.skipped.len()
        );
        Ok(report)
    }

    async fn recreate(&self, name: &str, stored: &StoredTable) -> Result<(), SyncError> {
        let snapshot = stored.to_snapshot()?;
        self.engine
            .create_table_from_rows(name, &snapshot.columns, snapshot.rows)
            .await?;
        Ok(())
    }

    async fn create_from_archive(&self, table: &ArchivedTable) -> Result<(), SyncError> {
        let name = &table.descriptor.name;
        let snapshot = table.decode()?;
        if snapshot.row_count != table.descriptor.row_count {
            tracing::warn!(
                "manifest lists {} rows for {} but the data holds {}",
                table.descriptor.row_count,
                name,
                snapshot.row_count
            );
        }

        self.engine
            .create_table_from_rows(name, &snapshot.columns, snapshot.rows)
            .await?;
        self.engine
            .register_virtual_file(&data_entry_name(name), table.data.clone())
            .await?;
        Ok(())
    }

    fn report_failures(&self, verb: &str, failures: &[TableFailure]) {
        for f in failures {
            tracing::warn!("could not {} table {}: {}", verb, f.name, f.error_detail);
            self.notifications.error(
                format!("Could not {} table \"{}\"", verb, f.name),
                f.error_detail.clone(),
            );
        }
    }

    fn finish_ok(&self, id: Ulid, message: String) {
        self.notifications.update(
            id,
            NotificationUpdate::kind(NotificationKind::Success).with_message(message),
        );
    }

    fn finish_err(&self, id: Ulid, error: &SyncError) {
        self.notifications.update(
            id,
            NotificationUpdate::kind(NotificationKind::Error).with_error_detail(error.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tablekeep_core::archive::MANIFEST_ENTRY;
    use tablekeep_core::Value;
    use tablekeep_store::tables::{HISTORY_KEY, META_KEY, table_key};
    use tablekeep_store::testing::{FaultOp, FaultyKvStore};
    use tablekeep_store::{HistoryEntry, KvStore, MemoryKvStore, QueryHistory};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use crate::memory::MemoryEngine;

    fn cities(n: i64) -> TableSnapshot {
        TableSnapshot::new(
            "cities",
            vec![
                Column::new("id", "BIGINT"),
                Column::new("city", "VARCHAR"),
                Column::new("big", "HUGEINT"),
            ],
            (0..n)
                .map(|i| {
                    vec![
                        Value::from(i),
                        Value::from(format!("San Francisco, CA #{}", i)),
                        Value::Integer("123456789012345678901234567890".parse().unwrap()),
                    ]
                })
                .collect(),
        )
    }

    fn simple(name: &str, n: i64) -> TableSnapshot {
        TableSnapshot::new(
            name,
            vec![Column::new("id", "INTEGER"), Column::new("ok", "BOOLEAN")],
            (0..n)
                .map(|i| vec![Value::from(i), Value::from(i % 2 == 0)])
                .collect(),
        )
    }

    fn unencodable(name: &str) -> TableSnapshot {
        TableSnapshot::new(
            name,
            vec![Column::new("tags", "VARCHAR[]")],
            vec![vec![Value::Unsupported {
                type_name: "LIST".to_string(),
            }]],
        )
    }

    struct Fixture {
        engine: Arc<MemoryEngine>,
        kv: Arc<FaultyKvStore>,
        sync: RegistrySynchronizer,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(MemoryEngine::new());
        let kv = Arc::new(FaultyKvStore::new());
        let sync = RegistrySynchronizer::new(
            engine.clone(),
            TableStore::new(kv.clone()),
            NotificationCenter::new(),
        );
        Fixture { engine, kv, sync }
    }

    /// A second session over the same store with an empty engine.
    fn reopen(kv: Arc<FaultyKvStore>) -> (Arc<MemoryEngine>, RegistrySynchronizer) {
        let engine = Arc::new(MemoryEngine::new());
        let sync = RegistrySynchronizer::new(
            engine.clone(),
            TableStore::new(kv),
            NotificationCenter::new(),
        );
        (engine, sync)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn save_table_requires_live_table() {
        let mut f = fixture();
        let err = f.sync.save_table("ghost").await.unwrap_err();
        assert!(matches!(err, SyncError::TableNotFound(ref n) if n == "ghost"));

        let records = f.sync.notifications().list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, NotificationKind::Error);
        assert!(f.sync.store().list_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_table_persists_and_warns_on_large_tables() {
        let mut f = fixture();
        f.engine.insert_table(cities(3));
        f.sync = f.sync.with_thresholds(RiskThresholds {
            warn_above: 2,
            strong_above: 10,
        });

        let outcome = f.sync.save_table("cities").await.unwrap();
        assert_eq!(outcome.row_count, 3);
        let warning = outcome.warning.expect("3 rows is above the warn bound");
        assert_eq!(warning.level, RiskLevel::Warn);
        assert!(warning.message.contains("cities"));

        let stored = f.sync.store().get("cities").await.unwrap().unwrap();
        assert_eq!(stored.to_snapshot().unwrap(), cities(3));
        assert_eq!(f.sync.status("cities").await.unwrap(), TableStatus::Persisted);

        let kinds: Vec<NotificationKind> =
            f.sync.notifications().list().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::Success, NotificationKind::Info]);
    }

    #[tokio::test]
    async fn save_all_continues_past_unencodable_table() {
        let mut f = fixture();
        f.engine.insert_table(simple("a", 2));
        f.engine.insert_table(unencodable("b"));
        f.engine.insert_table(simple("c", 1));

        let requested = names(&["a", "b", "c"]);
        let report = f.sync.save_all(&requested).await;

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.saved.len(), requested.len() - 1);
        assert_eq!(report.saved, vec!["a", "c"]);
        assert_eq!(report.errors[0].name, "b");
        assert!(report.errors[0].error_detail.contains("serialization"));

        let records = f.sync.notifications().list();
        let summary = &records[0];
        assert_eq!(summary.kind, NotificationKind::Success);
        assert_eq!(summary.message.as_deref(), Some("Saved 2/3 tables"));
        let error = records
            .iter()
            .find(|r| r.kind == NotificationKind::Error)
            .expect("error notification for b");
        assert!(error.title.contains("\"b\""));
        assert!(error.error_detail.is_some());

        assert_eq!(f.sync.store().list_names().await.unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn save_all_reports_store_failures_per_table() {
        let mut f = fixture();
        f.engine.insert_table(simple("a", 1));
        f.engine.insert_table(simple("b", 1));
        f.kv.fail(FaultOp::Set, &table_key("a"));

        let report = f.sync.save_all(&names(&["a", "missing", "b"])).await;
        assert_eq!(report.saved, vec!["b"]);
        let failed: Vec<&str> = report.errors.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(failed, vec!["a", "missing"]);
    }

    #[tokio::test]
    async fn restore_all_recreates_saved_tables_in_new_session() {
        let mut f = fixture();
        f.engine.insert_table(cities(4));
        f.engine.insert_table(simple("flags", 3));
        f.sync.save_all_live().await.unwrap();

        let (engine, mut sync) = reopen(f.kv.clone());
        let report = sync.restore_all().await.unwrap();

        assert_eq!(report.restored_count, 2);
        assert_eq!(report.table_names, vec!["cities", "flags"]);
        assert!(report.skipped.is_empty());
        assert_eq!(engine.table("cities").unwrap(), cities(4));
        assert_eq!(engine.table("flags").unwrap(), simple("flags", 3));
    }

    #[tokio::test]
    async fn restore_all_skips_corrupt_and_missing_snapshots() {
        let mut f = fixture();
        for name in ["good", "corrupt", "gone"] {
            f.engine.insert_table(simple(name, 2));
        }
        f.sync.save_all_live().await.unwrap();
        f.kv.set(&table_key("corrupt"), b"{not json").await.unwrap();
        f.kv.delete(&table_key("gone")).await.unwrap();

        let (engine, mut sync) = reopen(f.kv.clone());
        let report = sync.restore_all().await.unwrap();

        assert_eq!(report.table_names, vec!["good"]);
        let mut skipped: Vec<&str> = report.skipped.iter().map(|s| s.name.as_str()).collect();
        skipped.sort();
        assert_eq!(skipped, vec!["corrupt", "gone"]);
        assert_eq!(engine.list_live_tables().await.unwrap(), vec!["good"]);

        // The stale entry is pruned; the corrupt one stays listed.
        assert_eq!(
            sync.store().list_names().await.unwrap(),
            vec!["good", "corrupt"]
        );

        let records = sync.notifications().list();
        assert_eq!(records[0].kind, NotificationKind::Success);
        assert_eq!(records[0].message.as_deref(), Some("Restored 1/3 tables"));
        let mut errored: Vec<&str> = records
            .iter()
            .filter(|r| r.kind == NotificationKind::Error)
            .map(|r| r.title.as_str())
            .collect();
        errored.sort();
        assert_eq!(
            errored,
            vec![
                "Could not restore table \"corrupt\"",
                "Could not restore table \"gone\"",
            ]
        );
    }

    #[tokio::test]
    async fn auto_restore_degrades_to_empty_registry() {
        let mut f = fixture();
        f.engine.insert_table(simple("a", 1));
        f.sync.save_table("a").await.unwrap();
        f.kv.fail(FaultOp::Get, META_KEY);

        let (engine, mut sync) = reopen(f.kv.clone());
        let report = sync.auto_restore().await;

        assert_eq!(report, RestoreReport::default());
        assert!(engine.list_live_tables().await.unwrap().is_empty());
        let records = sync.notifications().list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, NotificationKind::Error);
    }

    #[tokio::test]
    async fn remove_table_twice_is_harmless() {
        let mut f = fixture();
        f.engine.insert_table(simple("a", 1));
        f.engine.insert_table(simple("b", 1));
        f.sync.save_all_live().await.unwrap();

        f.sync.remove_table("a").await.unwrap();
        let after_first = f.sync.store().list_names().await.unwrap();
        f.sync.remove_table("a").await.unwrap();

        assert_eq!(f.sync.store().list_names().await.unwrap(), after_first);
        assert_eq!(after_first, vec!["b"]);
        // Durable removal leaves the live table alone.
        assert_eq!(f.sync.status("a").await.unwrap(), TableStatus::LiveOnly);
    }

    #[tokio::test]
    async fn refresh_follows_table_state_machine() {
        let mut f = fixture();
        assert_eq!(f.sync.status("t").await.unwrap(), TableStatus::Absent);

        f.engine.insert_table(simple("t", 2));
        assert_eq!(f.sync.status("t").await.unwrap(), TableStatus::LiveOnly);

        f.sync.save_table("t").await.unwrap();
        assert_eq!(f.sync.status("t").await.unwrap(), TableStatus::Persisted);

        f.engine.drop_table("t");
        let view = f.sync.refresh().await.unwrap();
        assert!(view.tables.is_empty());
        assert_eq!(view.stale, vec!["t"]);
        assert_eq!(f.sync.status("t").await.unwrap(), TableStatus::Stale);

        f.sync.remove_table("t").await.unwrap();
        assert_eq!(f.sync.status("t").await.unwrap(), TableStatus::Absent);
    }

    #[tokio::test]
    async fn refresh_reports_schema_and_risk() {
        let mut f = fixture();
        f.engine.insert_table(simple("small", 1));
        f.engine.insert_table(simple("wide", 5));
        f.sync = f.sync.with_thresholds(RiskThresholds {
            warn_above: 2,
            strong_above: 4,
        });
        f.sync.save_table("small").await.unwrap();

        let view = f.sync.refresh().await.unwrap();
        assert_eq!(view.tables.len(), 2);
        assert_eq!(view.tables[0].status, TableStatus::Persisted);
        assert_eq!(view.tables[0].risk, RiskLevel::None);
        assert_eq!(view.tables[1].status, TableStatus::LiveOnly);
        assert_eq!(view.tables[1].risk, RiskLevel::Strong);
        assert_eq!(view.tables[1].row_count, 5);
        assert_eq!(view.tables[1].columns.len(), 2);
    }

    #[tokio::test]
    async fn export_then_import_round_trips_tables() {
        let f = fixture();
        f.engine.insert_table(cities(3));
        f.engine.insert_table(simple("flags", 2));
        f.engine.insert_table(unencodable("bad"));

        let exported = f
            .sync
            .export_archive(&names(&["cities", "bad", "nope", "flags"]))
            .await
            .unwrap();
        assert_eq!(exported.tables, vec!["cities", "flags"]);
        let failed: Vec<&str> = exported.errors.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(failed, vec!["nope", "bad"]);

        let (engine, mut sync) = reopen(Arc::new(FaultyKvStore::new()));
        let report = sync.import_archive(&exported.bytes).await.unwrap();

        assert_eq!(report.imported_count, 2);
        assert_eq!(report.total_count, 2);
        assert!(report.errors.is_empty());
        assert_eq!(engine.table("cities").unwrap(), cities(3));
        assert_eq!(engine.table("flags").unwrap(), simple("flags", 2));
        assert!(engine.virtual_file("cities.csv").is_some());

        let summary = &sync.notifications().list()[0];
        assert_eq!(summary.message.as_deref(), Some("Imported 2/2 tables"));
    }

    #[tokio::test]
    async fn import_without_manifest_touches_nothing() {
        let (engine, mut sync) = reopen(Arc::new(FaultyKvStore::new()));
        let bytes = zip_bytes(&[("t.csv", "id\n1\n")]);

        let err = sync.import_archive(&bytes).await.unwrap_err();
        assert!(matches!(err, SyncError::ArchiveFormat(_)));
        assert_eq!(engine.create_calls(), 0);

        let err = sync.import_archive(b"definitely not a zip").await.unwrap_err();
        assert!(matches!(err, SyncError::ArchiveFormat(_)));
        assert_eq!(engine.create_calls(), 0);
        assert!(
            sync.notifications()
                .list()
                .iter()
                .all(|r| r.kind == NotificationKind::Error)
        );
    }

    #[tokio::test]
    async fn import_missing_data_entry_follows_policy() {
        let manifest = r#"{
            "formatVersion": "1.0",
            "exportDate": "2024-05-01T12:00:00.000Z",
            "tables": [
                {"name": "a", "rowCount": 1, "columns": [{"name": "id", "type": "INTEGER"}]},
                {"name": "b", "rowCount": 1, "columns": [{"name": "id", "type": "INTEGER"}]}
            ]
        }"#;
        let bytes = zip_bytes(&[(MANIFEST_ENTRY, manifest), ("a.csv", "id\n7\n")]);

        let (engine, mut strict) = reopen(Arc::new(FaultyKvStore::new()));
        assert!(matches!(
            strict.import_archive(&bytes).await,
            Err(SyncError::ArchiveFormat(_))
        ));
        assert_eq!(engine.create_calls(), 0);

        let (engine, lenient) = reopen(Arc::new(FaultyKvStore::new()));
        let mut lenient = lenient.with_missing_entry_policy(MissingEntryPolicy::Skip);
        let report = lenient.import_archive(&bytes).await.unwrap();
        assert_eq!(report.imported_count, 1);
        assert_eq!(report.total_count, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].name, "b");
        assert_eq!(engine.create_calls(), 1);
        assert_eq!(
            engine.table("a").unwrap().rows,
            vec![vec![Value::from(7i64)]]
        );
    }

    #[tokio::test]
    async fn import_continues_past_engine_failure() {
        let f = fixture();
        f.engine.insert_table(simple("a", 1));
        f.engine.insert_table(simple("b", 1));
        let exported = f.sync.export_archive(&names(&["a", "b"])).await.unwrap();

        let (engine, mut sync) = reopen(Arc::new(FaultyKvStore::new()));
        engine.fail_creates_for("a");
        let report = sync.import_archive(&exported.bytes).await.unwrap();

        assert_eq!(report.table_names, vec!["b"]);
        assert_eq!(report.errors[0].name, "a");
        assert!(report.errors[0].error_detail.contains("engine io"));
        assert!(engine.virtual_file("a.csv").is_none());
        assert!(engine.virtual_file("b.csv").is_some());
    }

    #[tokio::test]
    async fn export_reports_repeated_names_and_keeps_going() {
        let f = fixture();
        f.engine.insert_table(simple("a", 1));
        f.engine.insert_table(simple("b", 2));

        let exported = f
            .sync
            .export_archive(&names(&["a", "b", "a"]))
            .await
            .unwrap();
        assert_eq!(exported.tables, vec!["a", "b"]);
        assert_eq!(exported.errors.len(), 1);
        assert_eq!(exported.errors[0].name, "a");
        assert!(exported.errors[0].error_detail.contains("more than once"));

        let (engine, mut sync) = reopen(Arc::new(FaultyKvStore::new()));
        let report = sync.import_archive(&exported.bytes).await.unwrap();
        assert_eq!(report.table_names, vec!["a", "b"]);
        assert_eq!(engine.table("b").unwrap(), simple("b", 2));
    }

    #[tokio::test]
    async fn clear_all_removes_tables_meta_and_history() {
        let mut f = fixture();
        f.engine.insert_table(simple("a", 1));
        f.sync.save_table("a").await.unwrap();
        QueryHistory::new(f.kv.clone())
            .append(HistoryEntry::new("SELECT * FROM a"))
            .await
            .unwrap();

        let report = f.sync.clear_all().await.unwrap();
        assert_eq!(report.deleted.len(), 3);
        assert!(report.failures.is_empty());
        assert!(f.kv.get(META_KEY).await.unwrap().is_none());
        assert!(f.kv.get(HISTORY_KEY).await.unwrap().is_none());
        assert_eq!(f.sync.status("a").await.unwrap(), TableStatus::LiveOnly);
    }

    #[tokio::test]
    async fn memory_kv_store_works_as_backend() {
        let engine = Arc::new(MemoryEngine::new());
        engine.insert_table(simple("t", 2));
        let mut sync = RegistrySynchronizer::new(
            engine,
            TableStore::new(Arc::new(MemoryKvStore::new())),
            NotificationCenter::new(),
        );
        sync.save_table("t").await.unwrap();
        assert_eq!(sync.status("t").await.unwrap(), TableStatus::Persisted);
    }
}
