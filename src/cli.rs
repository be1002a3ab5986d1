// ABOUTME: Command-line argument definitions for the tablekeep binary.
// ABOUTME: Global flags override the data directory and store backend from the environment.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Backend;

#[derive(Parser)]
#[command(
    name = "tablekeep",
    version,
    about = "Save, restore, export and import session tables"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Data directory (overrides TABLEKEEP_HOME).
    #[arg(long, value_name = "DIR", global = true)]
    pub home: Option<PathBuf>,

    /// Durable store backend (overrides TABLEKEEP_BACKEND).
    #[arg(long, value_enum, global = true)]
    pub backend: Option<Backend>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Restore saved tables and show their status.
    List,

    /// Restore saved tables and save every live table again.
    SaveAll,

    /// Write saved tables to a portable archive.
    Export {
        /// Archive file to write.
        #[arg(long, value_name = "FILE")]
        out: PathBuf,

        /// Comma-separated table names (default: all).
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },

    /// Load tables from an archive and save them.
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Delete one table's saved copy.
    Remove {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Delete all saved tables, metadata and query history.
    Clear,

    /// Show the query history, newest first.
    History {
        /// Clear the history instead of showing it.
        #[arg(long)]
        clear: bool,
    },
}
