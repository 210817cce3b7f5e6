//! Ledger entry command implementations

use anyhow::Result;
use sentinel_core::Database;

use super::{format_amount, truncate};

pub fn cmd_entries_list(db: &Database, limit: i64, include_deleted: bool) -> Result<()> {
    let entries = db.list_ledger_entries(limit, 0, include_deleted)?;

    if entries.is_empty() {
        println!("No ledger entries found. Import some with:");
        println!("  sentinel import --file ledger.csv");
        return Ok(());
    }

    let total = db.count_ledger_entries(include_deleted)?;

    println!();
    println!("📝 Ledger Entries ({} of {})", entries.len(), total);
    println!("   ─────────────────────────────────────────────────────────────");

    for entry in entries {
        let category = entry
            .category_id
            .map(|c| format!("cat {}", c))
            .unwrap_or_else(|| "\x1b[33muncategorized\x1b[0m".to_string());

        println!(
            "   [{}] {} │ {:>12} │ {:<40} │ {}{}",
            entry.id,
            entry.posting_date,
            format_amount(entry.amount),
            truncate(&entry.description, 40),
            category,
            if entry.is_deleted() { " (deleted)" } else { "" }
        );
    }

    Ok(())
}
