//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_detect` - Recalculate anomalies

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use sentinel_core::{
    AnomalyDetector, AuditEvent, Database, DetectionConfig, DetectionResults, DetectionScope,
};

use super::CLI_USER;

/// Open (and migrate) the database at `db_path`
pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    Database::new(path_str).context("Failed to open database")
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path)?;
    let entries = db.count_ledger_entries(true)?;
    if entries > 0 {
        println!("   Existing ledger: {} entries", entries);
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Import entries: sentinel import --file ledger.csv");
    println!("  2. Review anomalies: sentinel anomalies");
    println!("  3. Start web API: sentinel serve");

    Ok(())
}

pub fn cmd_detect(db_path: &Path, scope: &str) -> Result<()> {
    let db = open_db(db_path)?;
    run_detection(&db, scope)?;
    Ok(())
}

/// Recalculate anomalies for `scope`, print a summary and record it in the audit log
pub fn run_detection(db: &Database, scope: &str) -> Result<DetectionResults> {
    let scope: DetectionScope = scope.parse().map_err(anyhow::Error::msg)?;

    println!("🔍 Recalculating anomalies...");
    println!("   Scope: {}", scope.as_str());

    let detector = AnomalyDetector::with_config(db, DetectionConfig::from_env());
    let results = detector
        .run(scope, Utc::now())
        .context("Anomaly recalculation failed")?;

    db.log_audit(
        CLI_USER,
        &AuditEvent::Recalculate {
            scope,
            results,
            scheduled: false,
        },
    )?;

    println!();
    println!("📊 Detection Results");
    println!("   ─────────────────────────────");
    println!("   👯 Duplicate postings: {}", results.duplicates);
    println!("   🏷️  Uncategorized entries: {}", results.no_category);
    println!("   📈 Outlying amounts: {}", results.outliers);

    let pending = db.count_anomalies(Some(sentinel_core::AnomalyStatus::Pending))?;
    println!();
    if pending > 0 {
        println!(
            "⚠️  {} anomalies pending review. Run 'sentinel anomalies' to see details.",
            pending
        );
    } else {
        println!("✅ No pending anomalies. The ledger looks clean!");
    }

    Ok(results)
}
