// ABOUTME: Subcommand handlers for the tablekeep binary.
// ABOUTME: Each handler drives the registry synchronizer and prints a short summary to stdout.

use std::fs;

use anyhow::{Context, bail};
use tablekeep_core::TableFailure;
use tablekeep_core::risk::group_thousands;
use tablekeep_store::QueryHistory;
use tablekeep_sync::{Engine, RegistrySynchronizer, TableStatus};

use crate::cli::Command;

pub async fn run(
    command: Command,
    sync: &mut RegistrySynchronizer,
    history: &QueryHistory,
) -> anyhow::Result<()> {
    match command {
        Command::List => {
            sync.auto_restore().await;
            let view = sync.refresh().await?;
            if view.tables.is_empty() && view.stale.is_empty() {
                println!("no tables");
            }
            for table in &view.tables {
                println!(
                    "{}\t{} rows\t{}\t{:?}",
                    table.name,
                    group_thousands(table.row_count),
                    status_label(table.status),
                    table.risk
                );
            }
            for name in &view.stale {
                println!("{}\t-\t{}", name, status_label(TableStatus::Stale));
            }
        }

        Command::SaveAll => {
            sync.auto_restore().await;
            let report = sync.save_all_live().await?;
            println!("saved {} tables", report.saved.len());
            for warning in &report.warnings {
                println!("warning: {}", warning);
            }
            fail_on(&report.errors, "save")?;
        }

        Command::Export { out, tables } => {
            sync.auto_restore().await;
            let names = match tables {
                Some(names) => names,
                None => sync.engine().list_live_tables().await?,
            };
            let exported = sync.export_archive(&names).await?;
            fs::write(&out, &exported.bytes)
                .with_context(|| format!("writing archive {}", out.display()))?;
            println!("exported {} tables to {}", exported.tables.len(), out.display());
            fail_on(&exported.errors, "export")?;
        }

        Command::Import { file } => {
            let bytes =
                fs::read(&file).with_context(|| format!("reading archive {}", file.display()))?;
            let imported = sync.import_archive(&bytes).await?;
            let saved = sync.save_all(&imported.table_names).await;
            println!(
                "imported {}/{} tables, saved {}",
                imported.imported_count,
                imported.total_count,
                saved.saved.len()
            );
            let mut errors = imported.errors;
            errors.extend(saved.errors);
            fail_on(&errors, "import")?;
        }

        Command::Remove { name } => {
            sync.remove_table(&name).await?;
            println!("removed {}", name);
        }

        Command::Clear => {
            let report = sync.clear_all().await?;
            println!("deleted {} entries", report.deleted.len());
            if !report.failures.is_empty() {
                for (key, detail) in &report.failures {
                    eprintln!("could not delete {}: {}", key, detail);
                }
                bail!("{} entries could not be deleted", report.failures.len());
            }
        }

        Command::History { clear } => {
            if clear {
                history.clear().await?;
                println!("history cleared");
            } else {
                for entry in history.list().await? {
                    let duration = entry
                        .duration_ms
                        .map(|ms| format!("{} ms", ms))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{}\t{}\t{}",
                        entry.executed_at.to_rfc3339(),
                        duration,
                        entry.query
                    );
                }
            }
        }
    }
    Ok(())
}

fn status_label(status: TableStatus) -> &'static str {
    match status {
        TableStatus::Absent => "absent",
        TableStatus::LiveOnly => "live",
        TableStatus::Saving => "saving",
        TableStatus::Persisted => "saved",
        TableStatus::Stale => "stale",
    }
}

fn fail_on(errors: &[TableFailure], verb: &str) -> anyhow::Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    for e in errors {
        eprintln!("could not {} {}: {}", verb, e.name, e.error_detail);
    }
    bail!("{} tables failed to {}", errors.len(), verb)
}
