//! Sentinel CLI - Ledger anomaly detector
//!
//! Usage:
//!   sentinel init                    Initialize database
//!   sentinel import --file CSV       Import ledger entries
//!   sentinel detect --scope all      Recalculate anomalies
//!   sentinel anomalies               List pending anomalies
//!   sentinel resolve 3 merge --keep 10 --delete 11
//!   sentinel serve --port 3000       Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Import { file, no_detect } => commands::cmd_import(&cli.db, &file, no_detect),
        Commands::Detect { scope } => commands::cmd_detect(&cli.db, &scope),
        Commands::Anomalies { all, kind } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_anomalies_list(&db, all, kind.as_deref())
        }
        Commands::Show { id } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_anomaly_show(&db, id)
        }
        Commands::Resolve {
            id,
            action,
            keep,
            delete,
            category,
            note,
        } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_resolve(
                &db,
                id,
                &action,
                commands::ResolveArgs {
                    keep,
                    delete,
                    category,
                    note,
                },
            )
            .map(|_| ())
        }
        Commands::Entries { limit, deleted } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_entries_list(&db, limit, deleted)
        }
        Commands::Status => commands::cmd_status(&cli.db),
        Commands::Serve { port, host } => commands::cmd_serve(&cli.db, &host, port).await,
    }
}
