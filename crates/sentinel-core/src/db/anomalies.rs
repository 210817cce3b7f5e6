//! Anomaly store operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{Anomaly, AnomalyKind, AnomalyStatus, Finding};

const ANOMALY_COLUMNS: &str = "id, hash, kind, member_entry_ids, status, resolved_at, notes, \
     details, first_detected_at, last_detected_at";

fn row_to_anomaly(row: &Row<'_>) -> rusqlite::Result<Anomaly> {
    let kind_str: String = row.get(2)?;
    let members_json: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let resolved_at: Option<String> = row.get(5)?;
    let details_json: Option<String> = row.get(7)?;
    let first_detected: String = row.get(8)?;
    let last_detected: String = row.get(9)?;

    let kind = kind_str.parse::<AnomalyKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    let member_entry_ids: Vec<i64> = serde_json::from_str(&members_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = status_str.parse::<AnomalyStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Anomaly {
        id: row.get(0)?,
        hash: row.get(1)?,
        kind,
        member_entry_ids,
        status,
        resolved_at: resolved_at.as_deref().map(parse_datetime),
        notes: row.get(6)?,
        details: details_json.and_then(|s| serde_json::from_str(&s).ok()),
        first_detected_at: parse_datetime(&first_detected),
        last_detected_at: parse_datetime(&last_detected),
    })
}

impl Database {
    /// Insert a finding, or refresh the existing anomaly with the same hash
    ///
    /// A single statement, so concurrent runs producing the same hash collapse
    /// into one row. On conflict the last detection time is refreshed;
    /// `resolved_at` and `notes` are never touched. With `reopen` set, a
    /// terminal anomaly returns to `PENDING` and takes the new member set and
    /// details. Without it, a closed anomaly keeps the members and details it
    /// was closed with.
    pub fn upsert_anomaly(
        &self,
        finding: &Finding,
        now: DateTime<Utc>,
        reopen: bool,
    ) -> Result<i64> {
        let conn = self.conn()?;
        let members = serde_json::to_string(&finding.member_entry_ids)?;
        let details = serde_json::to_string(&finding.details)?;

        let id = conn.query_row(
            r#"
            INSERT INTO anomalies
                (hash, kind, member_entry_ids, status, details, first_detected_at, last_detected_at)
            VALUES (?1, ?2, ?3, 'PENDING', ?4, ?5, ?5)
            ON CONFLICT(hash) DO UPDATE SET
                member_entry_ids = CASE WHEN ?6 OR anomalies.status = 'PENDING'
                    THEN excluded.member_entry_ids ELSE anomalies.member_entry_ids END,
                details = CASE WHEN ?6 OR anomalies.status = 'PENDING'
                    THEN excluded.details ELSE anomalies.details END,
                last_detected_at = excluded.last_detected_at,
                status = CASE WHEN ?6 THEN 'PENDING' ELSE anomalies.status END
            RETURNING id
            "#,
            params![
                finding.hash,
                finding.kind.as_str(),
                members,
                details,
                format_datetime(&now),
                reopen,
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Get an anomaly by ID
    pub fn get_anomaly(&self, id: i64) -> Result<Option<Anomaly>> {
        let conn = self.conn()?;
        load_anomaly(&conn, id)
    }

    /// Get an anomaly by its identity hash
    pub fn get_anomaly_by_hash(&self, hash: &str) -> Result<Option<Anomaly>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM anomalies WHERE hash = ?", ANOMALY_COLUMNS);
        let anomaly = conn
            .query_row(&sql, params![hash], row_to_anomaly)
            .optional()?;
        Ok(anomaly)
    }

    /// List anomalies, optionally filtered by status and kind
    pub fn list_anomalies(
        &self,
        status: Option<AnomalyStatus>,
        kind: Option<AnomalyKind>,
    ) -> Result<Vec<Anomaly>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM anomalies
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR kind = ?2)
            ORDER BY last_detected_at DESC, id DESC
            "#,
            ANOMALY_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let anomalies = stmt
            .query_map(
                params![status.map(|s| s.as_str()), kind.map(|k| k.as_str())],
                row_to_anomaly,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(anomalies)
    }

    /// Count anomalies, optionally filtered by status
    pub fn count_anomalies(&self, status: Option<AnomalyStatus>) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM anomalies WHERE (?1 IS NULL OR status = ?1)",
            params![status.map(|s| s.as_str())],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Read an anomaly on an existing connection or transaction
pub(crate) fn load_anomaly(conn: &Connection, id: i64) -> Result<Option<Anomaly>> {
    let sql = format!("SELECT {} FROM anomalies WHERE id = ?", ANOMALY_COLUMNS);
    let anomaly = conn
        .query_row(&sql, params![id], row_to_anomaly)
        .optional()?;
    Ok(anomaly)
}

/// Move an anomaly into a terminal status
pub(crate) fn close_anomaly(
    conn: &Connection,
    id: i64,
    status: AnomalyStatus,
    now: DateTime<Utc>,
    notes: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE anomalies SET status = ?, resolved_at = ?, notes = COALESCE(?, notes) WHERE id = ?",
        params![status.as_str(), format_datetime(&now), notes, id],
    )?;
    Ok(())
}
