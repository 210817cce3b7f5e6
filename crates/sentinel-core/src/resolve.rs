//! Anomaly resolution
//!
//! Applies an operator's decision to one anomaly. The status check, the ledger
//! mutation and the status transition all run in one transaction: a failure
//! anywhere leaves both the ledger and the anomaly exactly as they were.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{self, AuditEvent, Database};
use crate::error::{Error, Result};
use crate::models::AnomalyStatus;

/// What the operator decided to do about an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionAction {
    /// Keep one entry and soft-delete the others
    Merge,
    /// The entries are legitimate; close the anomaly unchanged
    Keep,
    /// Not worth acting on; close the anomaly unchanged
    Ignore,
    /// Assign a category to every member entry
    SetCategory,
}

impl ResolutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "MERGE",
            Self::Keep => "KEEP",
            Self::Ignore => "IGNORE",
            Self::SetCategory => "SET_CATEGORY",
        }
    }
}

impl FromStr for ResolutionAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "MERGE" => Ok(Self::Merge),
            "KEEP" => Ok(Self::Keep),
            "IGNORE" => Ok(Self::Ignore),
            "SET_CATEGORY" | "SETCATEGORY" => Ok(Self::SetCategory),
            _ => Err(Error::validation(format!("Unknown resolution action: {}", s))),
        }
    }
}

impl std::fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action-specific arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionPayload {
    /// MERGE: the entry that survives
    #[serde(default)]
    pub keep_id: Option<i64>,
    /// MERGE: entries to soft-delete (nulls, zeros and `keep_id` are dropped)
    #[serde(default)]
    pub delete_ids: Vec<Option<i64>>,
    /// SET_CATEGORY: the category to assign
    #[serde(default, rename = "categoriaId", alias = "categoryId")]
    pub category_id: Option<i64>,
    /// Free-text note stored on the anomaly
    #[serde(default)]
    pub note: Option<String>,
}

impl ResolutionPayload {
    /// Entries a MERGE will soft-delete, in first-seen order
    fn delete_targets(&self) -> Vec<i64> {
        let mut targets: Vec<i64> = Vec::new();
        for id in self.delete_ids.iter().flatten().copied() {
            if id > 0 && Some(id) != self.keep_id && !targets.contains(&id) {
                targets.push(id);
            }
        }
        targets
    }

    fn note(&self) -> Option<&str> {
        self.note.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResolutionSummary {
    Merged { merged: usize },
    Ignored { ignored: bool },
    Categorized { categorized: usize },
}

/// Resolve an anomaly on behalf of `actor`, treating `now` as the resolution time
///
/// The audit row is written in the same transaction as the ledger and status
/// changes, so a resolution is never committed without its record.
///
/// Errors:
/// - `NotFound` when the anomaly does not exist
/// - `AlreadyResolved` when it is no longer `PENDING`
/// - `Validation` when the payload is missing what the action needs
///
/// None of these mutate anything.
pub fn resolve_anomaly(
    db: &Database,
    actor: &str,
    anomaly_id: i64,
    action: ResolutionAction,
    payload: &ResolutionPayload,
    now: DateTime<Utc>,
) -> Result<ResolutionSummary> {
    let summary = db.run_atomic(|tx| {
        let anomaly = db::load_anomaly(tx, anomaly_id)?
            .ok_or_else(|| Error::NotFound(format!("anomaly {}", anomaly_id)))?;

        if anomaly.status.is_terminal() {
            return Err(Error::AlreadyResolved(anomaly_id));
        }

        let summary = match action {
            ResolutionAction::Merge => {
                let keep_id = payload
                    .keep_id
                    .filter(|id| *id > 0)
                    .ok_or_else(|| Error::validation("MERGE requires keepId"))?;
                let targets = payload.delete_targets();
                if targets.is_empty() {
                    return Err(Error::validation("MERGE requires at least one deleteId"));
                }

                let outside: Vec<i64> = std::iter::once(keep_id)
                    .chain(targets.iter().copied())
                    .filter(|id| !anomaly.member_entry_ids.contains(id))
                    .collect();
                if !outside.is_empty() {
                    warn!(
                        "Merge of anomaly {} touches entries outside its members: {:?}",
                        anomaly_id, outside
                    );
                }

                let merged = db::soft_delete_entries(tx, &targets, now)?;
                db::close_anomaly(tx, anomaly_id, AnomalyStatus::Resolved, now, payload.note())?;
                ResolutionSummary::Merged { merged }
            }
            ResolutionAction::Keep | ResolutionAction::Ignore => {
                db::close_anomaly(tx, anomaly_id, AnomalyStatus::Ignored, now, payload.note())?;
                ResolutionSummary::Ignored { ignored: true }
            }
            ResolutionAction::SetCategory => {
                let category_id = payload
                    .category_id
                    .ok_or_else(|| Error::validation("SET_CATEGORY requires categoriaId"))?;
                if anomaly.member_entry_ids.is_empty() {
                    return Err(Error::validation("Anomaly has no member entries"));
                }

                let categorized =
                    db::set_category_for_entries(tx, &anomaly.member_entry_ids, category_id)?;
                db::close_anomaly(tx, anomaly_id, AnomalyStatus::Resolved, now, payload.note())?;
                ResolutionSummary::Categorized { categorized }
            }
        };

        db::record_audit(
            tx,
            actor,
            &AuditEvent::Resolve {
                anomaly_id,
                kind: anomaly.kind,
                action,
                member_entry_ids: anomaly.member_entry_ids,
                summary,
                note: payload.note().map(str::to_string),
            },
        )?;

        Ok(summary)
    })?;

    info!(
        "{} resolved anomaly {} with {}: {:?}",
        actor, anomaly_id, action, summary
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Anomaly, AnomalyKind, Finding, NewLedgerEntry};
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;

    const ACTOR: &str = "auditor@example.com";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 9, 30, 0).unwrap()
    }

    fn seed_entries(db: &Database, count: usize, category: Option<i64>) -> Vec<i64> {
        let entries: Vec<NewLedgerEntry> = (0..count)
            .map(|_| NewLedgerEntry {
                description: "Aluguel".to_string(),
                posting_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
                amount: -1500.0,
                category_id: category,
                unit_id: None,
            })
            .collect();
        db.insert_ledger_entries(&entries).unwrap()
    }

    fn seed_anomaly(db: &Database, kind: AnomalyKind, members: &[i64]) -> Anomaly {
        let finding = Finding {
            kind,
            hash: format!("test-{}-{:?}", kind, members),
            member_entry_ids: members.to_vec(),
            details: json!({}),
        };
        let id = db.upsert_anomaly(&finding, now(), true).unwrap();
        db.get_anomaly(id).unwrap().unwrap()
    }

    #[test]
    fn test_action_parsing_is_case_insensitive() {
        assert_eq!("merge".parse::<ResolutionAction>().unwrap(), ResolutionAction::Merge);
        assert_eq!(
            "set_category".parse::<ResolutionAction>().unwrap(),
            ResolutionAction::SetCategory
        );
        assert!(matches!(
            "delete".parse::<ResolutionAction>(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_payload_accepts_both_category_spellings() {
        let a: ResolutionPayload = serde_json::from_value(json!({"categoriaId": 7})).unwrap();
        let b: ResolutionPayload = serde_json::from_value(json!({"categoryId": 7})).unwrap();
        assert_eq!(a.category_id, Some(7));
        assert_eq!(b.category_id, Some(7));
    }

    #[test]
    fn test_delete_targets_filtered() {
        let payload: ResolutionPayload =
            serde_json::from_value(json!({"keepId": 1, "deleteIds": [1, null, 0, 2, 2, 3]}))
                .unwrap();
        assert_eq!(payload.delete_targets(), vec![2, 3]);
    }

    #[test]
    fn test_merge_soft_deletes_and_resolves() {
        let db = Database::in_memory().unwrap();
        let ids = seed_entries(&db, 3, Some(1));
        let anomaly = seed_anomaly(&db, AnomalyKind::Duplicate, &ids);

        let payload = ResolutionPayload {
            keep_id: Some(ids[0]),
            delete_ids: vec![Some(ids[1]), Some(ids[2])],
            note: Some("same rent posted twice".into()),
            ..Default::default()
        };
        let summary = resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::Merge,
            &payload,
            now(),
        )
        .unwrap();
        assert_eq!(summary, ResolutionSummary::Merged { merged: 2 });

        assert!(!db.get_ledger_entry(ids[0]).unwrap().unwrap().is_deleted());
        assert!(db.get_ledger_entry(ids[1]).unwrap().unwrap().is_deleted());
        assert!(db.get_ledger_entry(ids[2]).unwrap().unwrap().is_deleted());

        let resolved = db.get_anomaly(anomaly.id).unwrap().unwrap();
        assert_eq!(resolved.status, AnomalyStatus::Resolved);
        assert_eq!(resolved.resolved_at, Some(now()));
        assert_eq!(resolved.notes.as_deref(), Some("same rent posted twice"));
    }

    #[test]
    fn test_merge_requires_delete_ids() {
        let db = Database::in_memory().unwrap();
        let ids = seed_entries(&db, 2, Some(1));
        let anomaly = seed_anomaly(&db, AnomalyKind::Duplicate, &ids);

        let payload = ResolutionPayload {
            keep_id: Some(ids[0]),
            delete_ids: vec![Some(ids[0]), None],
            ..Default::default()
        };
        let err = resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::Merge,
            &payload,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let untouched = db.get_anomaly(anomaly.id).unwrap().unwrap();
        assert_eq!(untouched.status, AnomalyStatus::Pending);
        assert_eq!(db.count_ledger_entries(false).unwrap(), 2);
    }

    #[test]
    fn test_merge_requires_keep_id() {
        let db = Database::in_memory().unwrap();
        let ids = seed_entries(&db, 2, Some(1));
        let anomaly = seed_anomaly(&db, AnomalyKind::Duplicate, &ids);

        let payload = ResolutionPayload {
            delete_ids: vec![Some(ids[1])],
            ..Default::default()
        };
        let err = resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::Merge,
            &payload,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(db.count_ledger_entries(false).unwrap(), 2);
    }

    #[test]
    fn test_keep_and_ignore_close_without_touching_ledger() {
        for action in [ResolutionAction::Keep, ResolutionAction::Ignore] {
            let db = Database::in_memory().unwrap();
            let ids = seed_entries(&db, 2, Some(1));
            let anomaly = seed_anomaly(&db, AnomalyKind::Duplicate, &ids);

            let summary = resolve_anomaly(
                &db,
                ACTOR,
                anomaly.id,
                action,
                &ResolutionPayload::default(),
                now(),
            )
            .unwrap();
            assert_eq!(summary, ResolutionSummary::Ignored { ignored: true });

            let closed = db.get_anomaly(anomaly.id).unwrap().unwrap();
            assert_eq!(closed.status, AnomalyStatus::Ignored);
            assert_eq!(db.count_ledger_entries(false).unwrap(), 2);
        }
    }

    #[test]
    fn test_set_category_updates_members() {
        let db = Database::in_memory().unwrap();
        let ids = seed_entries(&db, 1, None);
        let anomaly = seed_anomaly(&db, AnomalyKind::NoCategory, &ids);

        let payload = ResolutionPayload {
            category_id: Some(12),
            ..Default::default()
        };
        let summary = resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::SetCategory,
            &payload,
            now(),
        )
        .unwrap();
        assert_eq!(summary, ResolutionSummary::Categorized { categorized: 1 });
        assert_eq!(
            db.get_ledger_entry(ids[0]).unwrap().unwrap().category_id,
            Some(12)
        );
        assert_eq!(
            db.get_anomaly(anomaly.id).unwrap().unwrap().status,
            AnomalyStatus::Resolved
        );
    }

    #[test]
    fn test_set_category_requires_category() {
        let db = Database::in_memory().unwrap();
        let ids = seed_entries(&db, 1, None);
        let anomaly = seed_anomaly(&db, AnomalyKind::NoCategory, &ids);

        let err = resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::SetCategory,
            &ResolutionPayload::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_set_category_rolls_back_on_failure() {
        let db = Database::in_memory().unwrap();
        let ids = seed_entries(&db, 3, None);
        let anomaly = seed_anomaly(&db, AnomalyKind::Duplicate, &ids);

        // Fail the update of the last member, after the first two succeeded
        db.conn()
            .unwrap()
            .execute_batch(&format!(
                "CREATE TRIGGER fail_category BEFORE UPDATE OF category_id ON ledger_entries
                 WHEN NEW.id = {} BEGIN SELECT RAISE(ABORT, 'forced'); END;",
                ids[2]
            ))
            .unwrap();

        let payload = ResolutionPayload {
            category_id: Some(5),
            ..Default::default()
        };
        let err = resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::SetCategory,
            &payload,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        for id in &ids {
            assert_eq!(db.get_ledger_entry(*id).unwrap().unwrap().category_id, None);
        }
        let after = db.get_anomaly(anomaly.id).unwrap().unwrap();
        assert_eq!(after.status, AnomalyStatus::Pending);
        assert!(after.resolved_at.is_none());
    }

    #[test]
    fn test_missing_anomaly() {
        let db = Database::in_memory().unwrap();
        let err = resolve_anomaly(
            &db,
            ACTOR,
            999,
            ResolutionAction::Ignore,
            &ResolutionPayload::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_second_resolution_is_rejected() {
        let db = Database::in_memory().unwrap();
        let ids = seed_entries(&db, 3, Some(1));
        let anomaly = seed_anomaly(&db, AnomalyKind::Duplicate, &ids);

        let payload = ResolutionPayload {
            keep_id: Some(ids[0]),
            delete_ids: vec![Some(ids[1])],
            ..Default::default()
        };
        resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::Merge,
            &payload,
            now(),
        )
        .unwrap();

        let again = ResolutionPayload {
            keep_id: Some(ids[0]),
            delete_ids: vec![Some(ids[2])],
            ..Default::default()
        };
        let err = resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::Merge,
            &again,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::AlreadyResolved(id) if id == anomaly.id));
        assert!(!db.get_ledger_entry(ids[2]).unwrap().unwrap().is_deleted());
    }

    #[test]
    fn test_concurrent_resolutions_only_one_wins() {
        let db = Database::in_memory().unwrap();
        let ids = seed_entries(&db, 2, Some(1));
        let anomaly = seed_anomaly(&db, AnomalyKind::Duplicate, &ids);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = db.clone();
                let anomaly_id = anomaly.id;
                std::thread::spawn(move || {
                    resolve_anomaly(
                        &db,
                        ACTOR,
                        anomaly_id,
                        ResolutionAction::Ignore,
                        &ResolutionPayload::default(),
                        now(),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(Error::AlreadyResolved(_))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(rejected, 3);
        assert_eq!(db.anomaly_history(anomaly.id).unwrap().len(), 1);
    }

    #[test]
    fn test_resolution_is_audited_with_outcome() {
        let db = Database::in_memory().unwrap();
        let ids = seed_entries(&db, 3, Some(1));
        let anomaly = seed_anomaly(&db, AnomalyKind::Duplicate, &ids);

        let payload = ResolutionPayload {
            keep_id: Some(ids[0]),
            delete_ids: vec![Some(ids[1]), Some(ids[2])],
            note: Some("  rent twice ".into()),
            ..Default::default()
        };
        resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::Merge,
            &payload,
            now(),
        )
        .unwrap();

        let history = db.anomaly_history(anomaly.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "resolve");
        assert_eq!(history[0].user_email, ACTOR);
        assert_eq!(history[0].anomaly_id, Some(anomaly.id));

        let details = history[0].details.as_ref().unwrap();
        assert_eq!(details["kind"], "DUPLICATE");
        assert_eq!(details["resolution"], "MERGE");
        assert_eq!(details["memberEntryIds"], json!(ids));
        assert_eq!(details["merged"], 2);
        assert_eq!(details["note"], "rent twice");
    }

    #[test]
    fn test_failed_audit_write_rolls_back_resolution() {
        let db = Database::in_memory().unwrap();
        let ids = seed_entries(&db, 2, Some(1));
        let anomaly = seed_anomaly(&db, AnomalyKind::Duplicate, &ids);

        db.conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_audit BEFORE INSERT ON audit_log
                 BEGIN SELECT RAISE(ABORT, 'audit unavailable'); END;",
            )
            .unwrap();

        let payload = ResolutionPayload {
            keep_id: Some(ids[0]),
            delete_ids: vec![Some(ids[1])],
            ..Default::default()
        };
        let err = resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::Merge,
            &payload,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        // Neither the ledger nor the anomaly moved
        assert!(!db.get_ledger_entry(ids[1]).unwrap().unwrap().is_deleted());
        let after = db.get_anomaly(anomaly.id).unwrap().unwrap();
        assert_eq!(after.status, AnomalyStatus::Pending);
        assert!(after.resolved_at.is_none());

        // Once the audit log accepts writes again, a retry goes through
        db.conn()
            .unwrap()
            .execute_batch("DROP TRIGGER fail_audit;")
            .unwrap();
        let summary = resolve_anomaly(
            &db,
            ACTOR,
            anomaly.id,
            ResolutionAction::Merge,
            &payload,
            now(),
        )
        .unwrap();
        assert_eq!(summary, ResolutionSummary::Merged { merged: 1 });
        assert_eq!(db.anomaly_history(anomaly.id).unwrap().len(), 1);
    }
}
