// ABOUTME: Configuration loading and validation for the tablekeep binary.
// ABOUTME: Reads TABLEKEEP_* environment variables and checks risk thresholds and flags.

use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use tablekeep_core::notify::DEFAULT_DURATION_MS;
use tablekeep_core::{MissingEntryPolicy, RiskThresholds};
use tablekeep_store::history::DEFAULT_HISTORY_LIMIT;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TABLEKEEP_BACKEND must be \"sqlite\" or \"dir\", got {0:?}")]
    InvalidBackend(String),

    #[error("{var} is not a valid number: {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} is not a valid boolean: {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("TABLEKEEP_STRONG_ROWS ({strong}) must not be below TABLEKEEP_WARN_ROWS ({warn})")]
    ThresholdOrder { warn: u64, strong: u64 },
}

/// Which durable store backs the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// One SQLite database file, `store.db`.
    Sqlite,
    /// One file per key under `kv/`.
    Dir,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "dir" => Ok(Backend::Dir),
            _ => Err(ConfigError::InvalidBackend(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TablekeepConfig {
    pub home: PathBuf,
    pub backend: Backend,
    pub thresholds: RiskThresholds,
    pub notify_ms: u64,
    pub lenient_import: bool,
    pub history_limit: usize,
}

impl TablekeepConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - TABLEKEEP_HOME: data directory (default: ~/.tablekeep)
    /// - TABLEKEEP_BACKEND: sqlite or dir (default: sqlite)
    /// - TABLEKEEP_WARN_ROWS: rows above which a table is risky (default: 1000000)
    /// - TABLEKEEP_STRONG_ROWS: rows above which a table is very risky (default: 5000000)
    /// - TABLEKEEP_NOTIFY_MS: auto-dismiss delay for notifications (default: 5000)
    /// - TABLEKEEP_LENIENT_IMPORT: skip archive tables with no data entry (default: false)
    /// - TABLEKEEP_HISTORY_LIMIT: retained query-history entries (default: 100)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`TablekeepConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let home = var("TABLEKEEP_HOME").map(PathBuf::from).unwrap_or_else(|| {
            lookup("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".tablekeep")
        });

        let backend = match var("TABLEKEEP_BACKEND") {
            Some(value) => value.parse()?,
            None => Backend::Sqlite,
        };

        let defaults = RiskThresholds::default();
        let warn_above = parse_number(&var, "TABLEKEEP_WARN_ROWS", defaults.warn_above)?;
        let strong_above = parse_number(&var, "TABLEKEEP_STRONG_ROWS", defaults.strong_above)?;
        if strong_above < warn_above {
            return Err(ConfigError::ThresholdOrder {
                warn: warn_above,
                strong: strong_above,
            });
        }

        let notify_ms = parse_number(&var, "TABLEKEEP_NOTIFY_MS", DEFAULT_DURATION_MS)?;
        let history_limit =
            parse_number(&var, "TABLEKEEP_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT as u64)? as usize;

        let lenient_import = match var("TABLEKEEP_LENIENT_IMPORT") {
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidBool {
                        var: "TABLEKEEP_LENIENT_IMPORT",
                        value,
                    });
                }
            },
            None => false,
        };

        Ok(Self {
            home,
            backend,
            thresholds: RiskThresholds {
                warn_above,
                strong_above,
            },
            notify_ms,
            lenient_import,
            history_limit,
        })
    }

    pub fn missing_entry_policy(&self) -> MissingEntryPolicy {
        if self.lenient_import {
            MissingEntryPolicy::Skip
        } else {
            MissingEntryPolicy::Reject
        }
    }

    /// Location of the durable store for the configured backend.
    pub fn store_path(&self) -> PathBuf {
        match self.backend {
            Backend::Sqlite => self.home.join("store.db"),
            Backend::Dir => self.home.join("kv"),
        }
    }
}

fn parse_number(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match var(key) {
        Some(value) => value
            .trim()
            .replace('_', "")
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var: key, value }),
        None => Ok(default),
    }
}
