// ABOUTME: Entry point for the tablekeep binary.
// ABOUTME: Loads configuration, initializes tracing, opens the durable store, and runs one subcommand.

mod cli;
mod commands;
mod config;
mod progress;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tablekeep_core::NotificationCenter;
use tablekeep_store::{DirKvStore, KvStore, QueryHistory, SqliteKvStore, StoreError, TableStore};
use tablekeep_sync::{MemoryEngine, RegistrySynchronizer};
use tokio::sync::oneshot;

use crate::cli::Cli;
use crate::config::{Backend, TablekeepConfig};

fn open_store(config: &TablekeepConfig) -> Result<Arc<dyn KvStore>, StoreError> {
    let path = config.store_path();
    let store: Arc<dyn KvStore> = match config.backend {
        Backend::Sqlite => Arc::new(SqliteKvStore::open(&path)?),
        Backend::Dir => Arc::new(DirKvStore::open(&path)?),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tablekeep=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = TablekeepConfig::from_env()?;
    if let Some(home) = cli.home {
        config.home = home;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    let kv = open_store(&config)
        .with_context(|| format!("opening store at {}", config.store_path().display()))?;
    tracing::debug!("using {:?} store at {}", config.backend, config.store_path().display());

    let notifications = NotificationCenter::with_default_duration(config.notify_ms);
    let (stop_log, log_stopped) = oneshot::channel();
    let log_task = progress::spawn_notification_log(notifications.subscribe(), log_stopped);

    let mut sync = RegistrySynchronizer::new(
        Arc::new(MemoryEngine::new()),
        TableStore::new(kv.clone()),
        notifications,
    )
    .with_thresholds(config.thresholds)
    .with_missing_entry_policy(config.missing_entry_policy());
    let history = QueryHistory::with_limit(kv, config.history_limit);

    let result = commands::run(cli.command, &mut sync, &history).await;

    let _ = stop_log.send(());
    let _ = log_task.await;
    result
}
