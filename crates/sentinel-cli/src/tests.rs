//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use chrono::{Duration, Utc};
use sentinel_core::test_utils::seed_sample_ledger;
use sentinel_core::{AnomalyKind, AnomalyStatus, Database, ResolutionSummary};
use tempfile::{NamedTempFile, TempDir};

use crate::commands::{self, format_amount, truncate, ResolveArgs};

fn setup_seeded_db() -> (Database, sentinel_core::test_utils::SampleLedger) {
    let db = Database::in_memory().unwrap();
    let sample = seed_sample_ledger(&db, Utc::now().date_naive()).unwrap();
    (db, sample)
}

fn pending_id(db: &Database, kind: AnomalyKind) -> i64 {
    db.list_anomalies(Some(AnomalyStatus::Pending), Some(kind))
        .unwrap()[0]
        .id
}

/// Write a CSV with postings dated relative to today
fn write_ledger_csv() -> NamedTempFile {
    let today = Utc::now().date_naive();
    let day = |n: i64| (today - Duration::days(n)).format("%d/%m/%Y").to_string();

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "data,descricao,valor,categoria_id,unidade_id").unwrap();
    writeln!(file, "{},Pgto Salário Maria,\"-2.500,00\",1,3", day(10)).unwrap();
    writeln!(file, "{},PAGAMENTO DE SALARIO MARIA,-2500.00,1,3", day(10)).unwrap();
    writeln!(file, "{},Material de escritório,\"-89,90\",,3", day(5)).unwrap();
    file.flush().unwrap();
    file
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("exactly ten", 11), "exactly ten");
    assert_eq!(truncate("this is a long description", 10), "this is...");
}

#[test]
fn test_truncate_multibyte() {
    // Must not split a character
    assert_eq!(truncate("Salário João da Silva", 10), "Salário...");
}

#[test]
fn test_format_amount_colors_by_sign() {
    assert!(format_amount(-12.5).contains("-12.50"));
    assert!(format_amount(-12.5).starts_with("\x1b[31m"));
    assert!(format_amount(40.0).contains("+40.00"));
    assert!(format_amount(40.0).starts_with("\x1b[32m"));
}

// ========== Core Command Tests ==========

#[test]
fn test_cmd_init_creates_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sentinel.db");

    commands::cmd_init(&path).unwrap();
    assert!(path.exists());

    // Re-running is harmless
    commands::cmd_init(&path).unwrap();
}

#[test]
fn test_run_detection_counts() {
    let (db, _sample) = setup_seeded_db();

    let results = commands::run_detection(&db, "all").unwrap();
    assert_eq!(results.duplicates, 1);
    assert_eq!(results.no_category, 1);
    assert_eq!(results.outliers, 1);

    let audit = db.list_audit_log(10).unwrap();
    assert_eq!(audit[0].action, "recalculate");
    assert_eq!(audit[0].user_email, commands::CLI_USER);
}

#[test]
fn test_run_detection_single_scope() {
    let (db, _sample) = setup_seeded_db();

    let results = commands::run_detection(&db, "outliers").unwrap();
    assert_eq!(results.duplicates, 0);
    assert_eq!(results.outliers, 1);
    assert_eq!(db.count_anomalies(None).unwrap(), 1);
}

#[test]
fn test_run_detection_invalid_scope() {
    let (db, _sample) = setup_seeded_db();

    let result = commands::run_detection(&db, "waste");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Unknown scope"));
    assert_eq!(db.count_anomalies(None).unwrap(), 0);
}

// ========== Import Command Tests ==========

#[test]
fn test_import_file_then_detect() {
    let db = Database::in_memory().unwrap();
    let csv = write_ledger_csv();

    let summary = commands::import_file(&db, csv.path(), false).unwrap();
    assert_eq!(summary.imported, 3);
    assert_eq!(summary.uncategorized, 1);

    // The two payroll spellings normalize to the same description
    let duplicates = db
        .list_anomalies(None, Some(AnomalyKind::Duplicate))
        .unwrap();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].member_entry_ids, vec![1, 2]);

    let uncategorized = db
        .list_anomalies(None, Some(AnomalyKind::NoCategory))
        .unwrap();
    assert_eq!(uncategorized.len(), 1);
    assert_eq!(uncategorized[0].member_entry_ids, vec![3]);
}

#[test]
fn test_import_file_without_detection() {
    let db = Database::in_memory().unwrap();
    let csv = write_ledger_csv();

    commands::import_file(&db, csv.path(), true).unwrap();
    assert_eq!(db.count_ledger_entries(false).unwrap(), 3);
    assert_eq!(db.count_anomalies(None).unwrap(), 0);

    let audit = db.list_audit_log(10).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "import");
    assert_eq!(audit[0].details.as_ref().unwrap()["imported"], 3);
}

#[test]
fn test_import_missing_file() {
    let db = Database::in_memory().unwrap();
    let dir = TempDir::new().unwrap();

    let result = commands::import_file(&db, &dir.path().join("missing.csv"), true);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Failed to open file"));
}

#[test]
fn test_import_bad_row_imports_nothing() {
    let db = Database::in_memory().unwrap();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,description,amount").unwrap();
    writeln!(file, "2024-01-05,Internet,-99.90").unwrap();
    writeln!(file, "not a date,Internet,-99.90").unwrap();
    file.flush().unwrap();

    let result = commands::import_file(&db, file.path(), true);
    assert!(result.is_err());
    assert_eq!(db.count_ledger_entries(true).unwrap(), 0);
}

// ========== Anomaly Command Tests ==========

#[test]
fn test_cmd_anomalies_list() {
    let (db, _sample) = setup_seeded_db();
    commands::run_detection(&db, "all").unwrap();

    assert!(commands::cmd_anomalies_list(&db, false, None).is_ok());
    assert!(commands::cmd_anomalies_list(&db, true, Some("OUTLIER")).is_ok());
}

#[test]
fn test_cmd_anomalies_list_invalid_kind() {
    let db = Database::in_memory().unwrap();
    assert!(commands::cmd_anomalies_list(&db, false, Some("strange")).is_err());
}

#[test]
fn test_cmd_anomaly_show() {
    let (db, _sample) = setup_seeded_db();
    commands::run_detection(&db, "all").unwrap();

    let id = pending_id(&db, AnomalyKind::Duplicate);
    assert!(commands::cmd_anomaly_show(&db, id).is_ok());

    let result = commands::cmd_anomaly_show(&db, 9999);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("not found"));
}

#[test]
fn test_cmd_resolve_merge() {
    let (db, sample) = setup_seeded_db();
    commands::run_detection(&db, "all").unwrap();
    let id = pending_id(&db, AnomalyKind::Duplicate);

    let summary = commands::cmd_resolve(
        &db,
        id,
        "merge",
        ResolveArgs {
            keep: Some(sample.salary_a),
            delete: vec![sample.salary_b],
            note: Some("same payroll".into()),
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(summary, ResolutionSummary::Merged { merged: 1 });
    assert!(db
        .get_ledger_entry(sample.salary_b)
        .unwrap()
        .unwrap()
        .is_deleted());

    let anomaly = db.get_anomaly(id).unwrap().unwrap();
    assert_eq!(anomaly.status, AnomalyStatus::Resolved);
    assert_eq!(anomaly.notes.as_deref(), Some("same payroll"));

    let audit = db.list_audit_log(1).unwrap();
    assert_eq!(audit[0].action, "resolve");
    assert_eq!(audit[0].anomaly_id, Some(id));
    assert_eq!(audit[0].user_email, commands::CLI_USER);
    assert_eq!(audit[0].details.as_ref().unwrap()["merged"], 1);
}

#[test]
fn test_cmd_resolve_twice_fails() {
    let (db, _sample) = setup_seeded_db();
    commands::run_detection(&db, "all").unwrap();
    let id = pending_id(&db, AnomalyKind::Outlier);

    commands::cmd_resolve(&db, id, "ignore", ResolveArgs::default()).unwrap();
    let result = commands::cmd_resolve(&db, id, "keep", ResolveArgs::default());

    assert!(result.is_err());
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("already resolved"), "{}", message);
    assert_eq!(
        db.get_anomaly(id).unwrap().unwrap().status,
        AnomalyStatus::Ignored
    );
}

#[test]
fn test_cmd_resolve_fails_whole_when_audit_cannot_be_written() {
    let (db, _sample) = setup_seeded_db();
    commands::run_detection(&db, "all").unwrap();
    let id = pending_id(&db, AnomalyKind::Outlier);

    db.conn()
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER reject_resolve_audit BEFORE INSERT ON audit_log
             WHEN NEW.action = 'resolve'
             BEGIN SELECT RAISE(ABORT, 'audit unavailable'); END;",
        )
        .unwrap();

    let result = commands::cmd_resolve(&db, id, "ignore", ResolveArgs::default());
    assert!(result.is_err());
    assert_eq!(
        db.get_anomaly(id).unwrap().unwrap().status,
        AnomalyStatus::Pending
    );

    db.conn()
        .unwrap()
        .execute_batch("DROP TRIGGER reject_resolve_audit;")
        .unwrap();
    commands::cmd_resolve(&db, id, "ignore", ResolveArgs::default()).unwrap();
    assert_eq!(
        db.get_anomaly(id).unwrap().unwrap().status,
        AnomalyStatus::Ignored
    );
}

#[test]
fn test_cmd_resolve_set_category() {
    let (db, sample) = setup_seeded_db();
    commands::run_detection(&db, "all").unwrap();
    let id = pending_id(&db, AnomalyKind::NoCategory);

    let summary = commands::cmd_resolve(
        &db,
        id,
        "set_category",
        ResolveArgs {
            category: Some(4),
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(summary, ResolutionSummary::Categorized { categorized: 1 });
    assert_eq!(
        db.get_ledger_entry(sample.uncategorized)
            .unwrap()
            .unwrap()
            .category_id,
        Some(4)
    );
}

#[test]
fn test_cmd_resolve_unknown_action() {
    let (db, _sample) = setup_seeded_db();
    commands::run_detection(&db, "all").unwrap();
    let id = pending_id(&db, AnomalyKind::Duplicate);

    let result = commands::cmd_resolve(&db, id, "delete", ResolveArgs::default());
    assert!(result.is_err());
    assert_eq!(
        db.get_anomaly(id).unwrap().unwrap().status,
        AnomalyStatus::Pending
    );
}

// ========== Entry and Status Command Tests ==========

#[test]
fn test_cmd_entries_list() {
    let (db, _sample) = setup_seeded_db();
    assert!(commands::cmd_entries_list(&db, 5, false).is_ok());
    assert!(commands::cmd_entries_list(&db, 5, true).is_ok());

    let empty = Database::in_memory().unwrap();
    assert!(commands::cmd_entries_list(&empty, 5, false).is_ok());
}

#[test]
fn test_duplicate_settings_show_forward_window() {
    let config = sentinel_core::DetectionConfig {
        duplicate_tolerance_days: 2,
        ..Default::default()
    };
    let line = commands::status::duplicate_settings(&config);
    assert!(line.contains("+2 days"), "{}", line);
    assert!(!line.contains('±'));
}

#[test]
fn test_cmd_status() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sentinel.db");

    // Missing database is reported, not an error
    assert!(commands::cmd_status(&path).is_ok());
    assert!(!path.exists());

    commands::cmd_init(&path).unwrap();
    assert!(commands::cmd_status(&path).is_ok());
}
