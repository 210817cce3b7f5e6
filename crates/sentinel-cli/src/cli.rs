//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sentinel - Find duplicated, uncategorized and outlying ledger postings
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Ledger anomaly detector", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "sentinel.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Import ledger entries from CSV
    ///
    /// Expected columns: date, description, amount, and optionally
    /// category_id and unit_id. Dates are day-first (31/01/2024) or ISO.
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,

        /// Skip anomaly recalculation after import
        #[arg(long)]
        no_detect: bool,
    },

    /// Recalculate anomalies
    Detect {
        /// Detection scope: all, duplicates, no_category, outliers
        #[arg(short, long, default_value = "all")]
        scope: String,
    },

    /// List anomalies (pending only unless --all)
    Anomalies {
        /// Include resolved and ignored anomalies
        #[arg(long)]
        all: bool,

        /// Only one kind: DUPLICATE, NO_CATEGORY, OUTLIER
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Show one anomaly with its entries and details
    Show {
        /// Anomaly ID
        id: i64,
    },

    /// Resolve an anomaly
    Resolve {
        /// Anomaly ID
        id: i64,

        /// Action: merge, keep, ignore, set_category
        action: String,

        /// Entry to keep (merge)
        #[arg(long)]
        keep: Option<i64>,

        /// Entries to soft-delete (merge)
        #[arg(long, num_args = 1..)]
        delete: Vec<i64>,

        /// Category to assign (set_category)
        #[arg(long)]
        category: Option<i64>,

        /// Note stored on the anomaly
        #[arg(long)]
        note: Option<String>,
    },

    /// List recent ledger entries
    Entries {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Include soft-deleted entries
        #[arg(long)]
        deleted: bool,
    },

    /// Show database status
    Status,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}
