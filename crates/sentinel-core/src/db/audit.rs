//! Audit log of recalculations, imports and anomaly decisions
//!
//! Events are typed: each one knows its action name, the anomaly it concerns
//! (if any) and the JSON details stored with it. `record_audit` writes through
//! a borrowed connection so a resolution can log itself inside its own
//! transaction.

use rusqlite::{params, Connection, Row};
use serde::Serialize;
use serde_json::{json, Value};

use super::Database;
use crate::detect::{DetectionResults, DetectionScope};
use crate::error::Result;
use crate::import::ImportSummary;
use crate::models::{AnomalyKind, AnomalyStatus};
use crate::resolve::{ResolutionAction, ResolutionSummary};

/// Something worth recording against an actor
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    /// Detectors ran over the ledger
    Recalculate {
        scope: DetectionScope,
        results: DetectionResults,
        scheduled: bool,
    },
    /// Ledger entries were loaded from a CSV
    Import {
        source: String,
        summary: ImportSummary,
    },
    /// A decision was applied to an anomaly
    Resolve {
        anomaly_id: i64,
        kind: AnomalyKind,
        action: ResolutionAction,
        member_entry_ids: Vec<i64>,
        summary: ResolutionSummary,
        note: Option<String>,
    },
    /// Anomalies were listed
    ListAnomalies {
        status: Option<AnomalyStatus>,
        kind: Option<AnomalyKind>,
        count: usize,
    },
    /// A single anomaly was read
    ViewAnomaly { anomaly_id: i64 },
}

impl AuditEvent {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Recalculate { scheduled: false, .. } => "recalculate",
            Self::Recalculate { scheduled: true, .. } => "recalculate_scheduled",
            Self::Import { .. } => "import",
            Self::Resolve { .. } => "resolve",
            Self::ListAnomalies { .. } => "list",
            Self::ViewAnomaly { .. } => "view",
        }
    }

    pub fn anomaly_id(&self) -> Option<i64> {
        match self {
            Self::Resolve { anomaly_id, .. } | Self::ViewAnomaly { anomaly_id } => {
                Some(*anomaly_id)
            }
            _ => None,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Recalculate { scope, results, .. } => Some(json!({
                "scope": scope.as_str(),
                "duplicates": results.duplicates,
                "noCategory": results.no_category,
                "outliers": results.outliers,
            })),
            Self::Import { source, summary } => Some(json!({
                "source": source,
                "imported": summary.imported,
                "uncategorized": summary.uncategorized,
            })),
            Self::Resolve {
                kind,
                action,
                member_entry_ids,
                summary,
                note,
                ..
            } => {
                let mut details = json!({
                    "kind": kind,
                    "resolution": action,
                    "memberEntryIds": member_entry_ids,
                    "note": note,
                });
                match summary {
                    ResolutionSummary::Merged { merged } => details["merged"] = json!(merged),
                    ResolutionSummary::Ignored { ignored } => details["ignored"] = json!(ignored),
                    ResolutionSummary::Categorized { categorized } => {
                        details["categorized"] = json!(categorized)
                    }
                }
                Some(details)
            }
            Self::ListAnomalies {
                status,
                kind,
                count,
            } => Some(json!({ "status": status, "kind": kind, "count": count })),
            Self::ViewAnomaly { .. } => None,
        }
    }
}

/// Audit log entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_email: String,
    pub action: String,
    pub anomaly_id: Option<i64>,
    pub details: Option<Value>,
}

fn row_to_entry(row: &Row) -> rusqlite::Result<AuditEntry> {
    let details: Option<String> = row.get(5)?;
    let details = details
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        user_email: row.get(2)?,
        action: row.get(3)?,
        anomaly_id: row.get(4)?,
        details,
    })
}

/// Append `event` on `conn`; inside a transaction the row commits or rolls
/// back with it
pub(crate) fn record_audit(
    conn: &Connection,
    user_email: &str,
    event: &AuditEvent,
) -> Result<i64> {
    let details = event.details().map(|d| d.to_string());

    conn.execute(
        r#"
        INSERT INTO audit_log (user_email, action, anomaly_id, details)
        VALUES (?, ?, ?, ?)
        "#,
        params![user_email, event.action(), event.anomaly_id(), details],
    )?;

    Ok(conn.last_insert_rowid())
}

impl Database {
    /// Record an event that is not part of a larger transaction
    pub fn log_audit(&self, user_email: &str, event: &AuditEvent) -> Result<i64> {
        let conn = self.conn()?;
        record_audit(&conn, user_email, event)
    }

    /// List audit log entries, newest first
    pub fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, timestamp, user_email, action, anomaly_id, details
            FROM audit_log
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )?;

        let entries = stmt
            .query_map(params![limit], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Everything recorded against one anomaly, oldest first
    pub fn anomaly_history(&self, anomaly_id: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, timestamp, user_email, action, anomaly_id, details
            FROM audit_log
            WHERE anomaly_id = ?
            ORDER BY id
            "#,
        )?;

        let entries = stmt
            .query_map(params![anomaly_id], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
