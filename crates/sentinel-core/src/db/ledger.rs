//! Ledger entry operations
//!
//! Detection only ever reads entries that are not soft-deleted. The two write
//! helpers at the bottom run inside a resolution transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{LedgerEntry, NewLedgerEntry};

const ENTRY_COLUMNS: &str =
    "id, description, posting_date, amount, category_id, unit_id, deleted_at, created_at";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let date_str: String = row.get(2)?;
    let posting_date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let deleted_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;

    Ok(LedgerEntry {
        id: row.get(0)?,
        description: row.get(1)?,
        posting_date,
        amount: row.get(3)?,
        category_id: row.get(4)?,
        unit_id: row.get(5)?,
        deleted_at: deleted_at.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created_at),
    })
}

fn insert_entry(conn: &Connection, entry: &NewLedgerEntry) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO ledger_entries (description, posting_date, amount, category_id, unit_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![
            entry.description,
            entry.posting_date.format("%Y-%m-%d").to_string(),
            entry.amount,
            entry.category_id,
            entry.unit_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Database {
    /// Insert a single ledger entry
    pub fn insert_ledger_entry(&self, entry: &NewLedgerEntry) -> Result<i64> {
        let conn = self.conn()?;
        insert_entry(&conn, entry)
    }

    /// Insert a batch of ledger entries in one transaction
    pub fn insert_ledger_entries(&self, entries: &[NewLedgerEntry]) -> Result<Vec<i64>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(insert_entry(&tx, entry)?);
        }

        tx.commit()?;
        Ok(ids)
    }

    /// Get a ledger entry by ID, including soft-deleted ones
    pub fn get_ledger_entry(&self, id: i64) -> Result<Option<LedgerEntry>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM ledger_entries WHERE id = ?", ENTRY_COLUMNS);

        match conn.query_row(&sql, params![id], row_to_entry) {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List ledger entries, newest posting first
    pub fn list_ledger_entries(
        &self,
        limit: i64,
        offset: i64,
        include_deleted: bool,
    ) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn()?;
        let filter = if include_deleted {
            ""
        } else {
            "WHERE deleted_at IS NULL"
        };
        let sql = format!(
            "SELECT {} FROM ledger_entries {} ORDER BY posting_date DESC, id DESC LIMIT ? OFFSET ?",
            ENTRY_COLUMNS, filter
        );

        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![limit, offset], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Active (not soft-deleted) entries posted on or after `since`
    pub fn list_active_entries_since(&self, since: NaiveDate) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM ledger_entries
            WHERE deleted_at IS NULL AND posting_date >= ?
            ORDER BY posting_date, id
            "#,
            ENTRY_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![since.format("%Y-%m-%d").to_string()], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Active entries with no category, regardless of date
    pub fn list_uncategorized_entries(&self) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM ledger_entries
            WHERE deleted_at IS NULL AND category_id IS NULL
            ORDER BY id
            "#,
            ENTRY_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Update the category of a single active entry
    pub fn set_entry_category(&self, id: i64, category_id: Option<i64>) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE ledger_entries SET category_id = ? WHERE id = ? AND deleted_at IS NULL",
            params![category_id, id],
        )?;

        if updated == 0 {
            return Err(Error::NotFound(format!("ledger entry {}", id)));
        }
        Ok(())
    }

    /// Count ledger entries
    pub fn count_ledger_entries(&self, include_deleted: bool) -> Result<i64> {
        let conn = self.conn()?;
        let sql = if include_deleted {
            "SELECT COUNT(*) FROM ledger_entries"
        } else {
            "SELECT COUNT(*) FROM ledger_entries WHERE deleted_at IS NULL"
        };
        let count = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Soft-delete the given entries. Already-deleted entries are left untouched.
/// Returns how many entries were newly marked deleted.
pub(crate) fn soft_delete_entries(
    conn: &Connection,
    ids: &[i64],
    now: DateTime<Utc>,
) -> Result<usize> {
    let deleted_at = format_datetime(&now);
    let mut stmt = conn
        .prepare("UPDATE ledger_entries SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")?;

    let mut deleted = 0;
    for id in ids {
        deleted += stmt.execute(params![deleted_at, id])?;
    }
    Ok(deleted)
}

/// Assign `category_id` to each active entry, one statement per entry
pub(crate) fn set_category_for_entries(
    conn: &Connection,
    ids: &[i64],
    category_id: i64,
) -> Result<usize> {
    let mut stmt = conn
        .prepare("UPDATE ledger_entries SET category_id = ? WHERE id = ? AND deleted_at IS NULL")?;

    let mut updated = 0;
    for id in ids {
        updated += stmt.execute(params![category_id, id])?;
    }
    Ok(updated)
}
