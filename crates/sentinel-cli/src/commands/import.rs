//! Import command implementation

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use sentinel_core::{import_ledger_csv, AuditEvent, Database, ImportSummary};

use super::{open_db, run_detection, CLI_USER};

pub fn cmd_import(db_path: &Path, file: &Path, skip_detection: bool) -> Result<()> {
    let db = open_db(db_path)?;
    import_file(&db, file, skip_detection)?;
    Ok(())
}

/// Import a ledger CSV into `db`, then recalculate anomalies unless skipped
pub fn import_file(db: &Database, file: &Path, skip_detection: bool) -> Result<ImportSummary> {
    println!("📥 Importing ledger entries from {}...", file.display());

    let csv_file =
        File::open(file).with_context(|| format!("Failed to open file: {}", file.display()))?;
    let summary = import_ledger_csv(db, BufReader::new(csv_file))
        .with_context(|| format!("Failed to import {}", file.display()))?;

    db.log_audit(
        CLI_USER,
        &AuditEvent::Import {
            source: file.display().to_string(),
            summary,
        },
    )?;

    println!("   ✅ Imported {} entries", summary.imported);
    if summary.uncategorized > 0 {
        println!("   🏷️  {} entries have no category", summary.uncategorized);
    }

    if skip_detection {
        println!();
        println!("   Skipped recalculation. Run 'sentinel detect' when ready.");
    } else if summary.imported > 0 {
        println!();
        run_detection(db, "all")?;
    }

    Ok(summary)
}
