//! Sentinel Core Library
//!
//! Shared functionality for the Sentinel ledger anomaly detector:
//! - Database access and migrations (ledger, anomaly store, audit log)
//! - Description normalization
//! - Duplicate, missing-category and outlier detection
//! - Transactional anomaly resolution
//! - CSV import of ledger entries

pub mod db;
pub mod detect;
pub mod error;
pub mod import;
pub mod models;
pub mod normalize;
pub mod resolve;

/// Ledger fixtures for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use db::{AuditEntry, AuditEvent, Database};
pub use detect::{AnomalyDetector, DetectionConfig, DetectionResults, DetectionScope};
pub use error::{Error, Result};
pub use import::{import_ledger_csv, parse_ledger_csv, ImportSummary};
pub use models::{
    Anomaly, AnomalyKind, AnomalyStatus, Finding, LedgerEntry, NewLedgerEntry,
};
pub use normalize::normalize_description;
pub use resolve::{resolve_anomaly, ResolutionAction, ResolutionPayload, ResolutionSummary};
