//! Test utilities for sentinel-core
//!
//! Ledger fixtures shared by unit tests and the server tests (enable the
//! `test-utils` feature to use them from other crates).

use chrono::{Duration, NaiveDate};

use crate::db::Database;
use crate::models::NewLedgerEntry;

/// Build a new ledger entry posted `days_ago` days before `today`
pub fn entry_days_ago(
    today: NaiveDate,
    days_ago: i64,
    description: &str,
    amount: f64,
    category_id: Option<i64>,
    unit_id: Option<i64>,
) -> NewLedgerEntry {
    NewLedgerEntry {
        description: description.to_string(),
        posting_date: today - Duration::days(days_ago),
        amount,
        category_id,
        unit_id,
    }
}

/// Ids of the entries seeded by [`seed_sample_ledger`]
#[derive(Debug, Clone, Copy)]
pub struct SampleLedger {
    /// Two spellings of the same payroll posting on the same day
    pub salary_a: i64,
    pub salary_b: i64,
    /// Rent posted with no category
    pub uncategorized: i64,
    /// Utility bill far above its cohort
    pub outlier: i64,
}

/// Seed a small ledger, dated relative to `today`, containing one duplicate
/// pair, one uncategorized entry and one outlier
pub fn seed_sample_ledger(db: &Database, today: NaiveDate) -> crate::Result<SampleLedger> {
    let unit = Some(7);
    let entries = vec![
        entry_days_ago(today, 25, "SALÁRIO - JOÃO DA SILVA", -3200.0, Some(1), unit),
        entry_days_ago(today, 25, "Salario:João da Silva", -3200.0, Some(1), unit),
        entry_days_ago(today, 20, "Aluguel sede", -1500.0, None, unit),
        entry_days_ago(today, 140, "Energia", -310.0, Some(2), unit),
        entry_days_ago(today, 110, "Energia", -305.0, Some(2), unit),
        entry_days_ago(today, 80, "Energia", -298.0, Some(2), unit),
        entry_days_ago(today, 50, "Energia", -312.0, Some(2), unit),
        entry_days_ago(today, 20, "Energia", -2950.0, Some(2), unit),
    ];
    let ids = db.insert_ledger_entries(&entries)?;

    Ok(SampleLedger {
        salary_a: ids[0],
        salary_b: ids[1],
        uncategorized: ids[2],
        outlier: ids[7],
    })
}
