//! Status command implementation

use std::path::Path;

use anyhow::Result;
use sentinel_core::{AnomalyStatus, DetectionConfig};

use super::open_db;

pub fn cmd_status(db_path: &Path) -> Result<()> {
    println!();
    println!("📊 Sentinel Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if !db_path.exists() {
        println!("   Size: (database not initialized)");
        println!();
        println!("   Run 'sentinel init' to create it.");
        return Ok(());
    }

    if let Ok(metadata) = std::fs::metadata(db_path) {
        let size_kb = metadata.len() as f64 / 1024.0;
        if size_kb < 1024.0 {
            println!("   Size: {:.1} KB", size_kb);
        } else {
            println!("   Size: {:.1} MB", size_kb / 1024.0);
        }
    }

    let db = open_db(db_path)?;
    let active = db.count_ledger_entries(false)?;
    let all = db.count_ledger_entries(true)?;

    println!();
    println!("   Ledger entries: {} ({} soft-deleted)", active, all - active);
    println!(
        "   Anomalies: {} pending, {} resolved, {} ignored",
        db.count_anomalies(Some(AnomalyStatus::Pending))?,
        db.count_anomalies(Some(AnomalyStatus::Resolved))?,
        db.count_anomalies(Some(AnomalyStatus::Ignored))?
    );

    let config = DetectionConfig::from_env();
    println!();
    println!("   Detection settings:");
    println!("{}", duplicate_settings(&config));
    println!(
        "     Outliers: {} months back, z > {}, deviation > {:.0}%",
        config.outlier_lookback_months,
        config.outlier_z_threshold,
        config.outlier_relative_threshold * 100.0
    );
    println!(
        "     Reopen on re-detect: {}",
        config.reopen_on_redetect
    );

    Ok(())
}

/// Duplicate window is forward-only: a bucket spans `[d, d + tolerance]`
pub(crate) fn duplicate_settings(config: &DetectionConfig) -> String {
    format!(
        "     Duplicates: {} months back, +{} days, per unit: {}",
        config.duplicate_lookback_months,
        config.duplicate_tolerance_days,
        config.duplicate_include_unit
    )
}
