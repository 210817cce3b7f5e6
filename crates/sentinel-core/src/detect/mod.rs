//! Anomaly detection algorithms
//!
//! Detects:
//! - Duplicates: postings that look like the same transaction entered twice
//! - Missing categories: active postings with no category assigned
//! - Outliers: amounts far from their (category, unit) cohort's median
//!
//! Each detector is a pure function over ledger entries that returns
//! [`Finding`]s. [`AnomalyDetector`] loads the entries, runs the detectors and
//! upserts the findings by hash, so re-running is idempotent.

use std::str::FromStr;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::models::{AnomalyKind, Finding};

mod duplicates;
mod no_category;
mod outliers;

pub use duplicates::find_duplicates;
pub use no_category::find_uncategorized;
pub use outliers::{find_outliers, median};

/// Largest supported duplicate date tolerance, in days
pub const MAX_TOLERANCE_DAYS: u32 = 3;

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// How far back (in months) duplicate detection looks
    pub duplicate_lookback_months: u32,
    /// Extra days a posting may trail its twin and still count as a duplicate
    pub duplicate_tolerance_days: u32,
    /// Only treat postings of the same unit as duplicates
    pub duplicate_include_unit: bool,
    /// How far back (in months) outlier cohorts are built
    pub outlier_lookback_months: u32,
    /// Robust z-score above which an amount is an outlier
    pub outlier_z_threshold: f64,
    /// Relative deviation from the median above which an amount is an outlier
    pub outlier_relative_threshold: f64,
    /// MAD scale factor (makes MAD comparable to a standard deviation)
    pub mad_scale: f64,
    /// Re-detecting a resolved or ignored anomaly moves it back to PENDING
    pub reopen_on_redetect: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            duplicate_lookback_months: 18,
            duplicate_tolerance_days: 0, // exact date match
            duplicate_include_unit: true,
            outlier_lookback_months: 6,
            outlier_z_threshold: 3.0,
            outlier_relative_threshold: 0.30, // 30% away from the median
            mad_scale: 1.4826,
            reopen_on_redetect: true,
        }
    }
}

impl DetectionConfig {
    /// Build a config from `SENTINEL_*` environment variables
    ///
    /// Unset or unparseable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut tolerance = env_or(
            "SENTINEL_DUPLICATE_TOLERANCE_DAYS",
            defaults.duplicate_tolerance_days,
        );
        if tolerance > MAX_TOLERANCE_DAYS {
            warn!(
                "SENTINEL_DUPLICATE_TOLERANCE_DAYS={} exceeds {}, clamping",
                tolerance, MAX_TOLERANCE_DAYS
            );
            tolerance = MAX_TOLERANCE_DAYS;
        }

        Self {
            duplicate_lookback_months: env_or(
                "SENTINEL_DUPLICATE_LOOKBACK_MONTHS",
                defaults.duplicate_lookback_months,
            ),
            duplicate_tolerance_days: tolerance,
            duplicate_include_unit: env_flag(
                "SENTINEL_DUPLICATE_BY_UNIT",
                defaults.duplicate_include_unit,
            ),
            outlier_lookback_months: env_or(
                "SENTINEL_OUTLIER_LOOKBACK_MONTHS",
                defaults.outlier_lookback_months,
            ),
            outlier_z_threshold: env_or(
                "SENTINEL_OUTLIER_Z_THRESHOLD",
                defaults.outlier_z_threshold,
            ),
            outlier_relative_threshold: env_or(
                "SENTINEL_OUTLIER_RELATIVE_THRESHOLD",
                defaults.outlier_relative_threshold,
            ),
            mad_scale: defaults.mad_scale,
            reopen_on_redetect: env_flag(
                "SENTINEL_REOPEN_ON_REDETECT",
                defaults.reopen_on_redetect,
            ),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("TRUE") | Some("yes") => true,
        Some("0") | Some("false") | Some("FALSE") | Some("no") => false,
        _ => default,
    }
}

/// Which detectors a recalculation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionScope {
    #[default]
    All,
    Duplicates,
    NoCategory,
    Outliers,
}

impl DetectionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Duplicates => "duplicates",
            Self::NoCategory => "no_category",
            Self::Outliers => "outliers",
        }
    }

    fn includes(&self, kind: AnomalyKind) -> bool {
        match self {
            Self::All => true,
            Self::Duplicates => kind == AnomalyKind::Duplicate,
            Self::NoCategory => kind == AnomalyKind::NoCategory,
            Self::Outliers => kind == AnomalyKind::Outlier,
        }
    }
}

impl FromStr for DetectionScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "all" | "ALL" => Ok(Self::All),
            "duplicates" | "duplicate" | "DUPLICATE" => Ok(Self::Duplicates),
            "no_category" | "noCategory" | "no-category" | "NO_CATEGORY" => Ok(Self::NoCategory),
            "outliers" | "outlier" | "OUTLIER" => Ok(Self::Outliers),
            other => Err(format!(
                "Unknown scope: {} (expected all, duplicates, no_category or outliers)",
                other
            )),
        }
    }
}

/// Results of running detection: findings upserted per kind
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResults {
    pub duplicates: usize,
    pub no_category: usize,
    pub outliers: usize,
}

impl DetectionResults {
    pub fn total(&self) -> usize {
        self.duplicates + self.no_category + self.outliers
    }
}

/// Derive the identity hash of an anomaly from its kind and condition key
pub fn anomaly_hash(kind: AnomalyKind, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// First posting date inside a lookback window ending at `today`
pub fn lookback_start(today: NaiveDate, months: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// Main detector that runs all algorithms
pub struct AnomalyDetector<'a> {
    db: &'a Database,
    config: DetectionConfig,
}

impl<'a> AnomalyDetector<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            config: DetectionConfig::default(),
        }
    }

    pub fn with_config(db: &'a Database, config: DetectionConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Run the detectors selected by `scope`, treating `now` as the current time
    ///
    /// Each detector persists its own findings; a failure in one leaves the
    /// anomalies already written by the others in place.
    pub fn run(&self, scope: DetectionScope, now: DateTime<Utc>) -> Result<DetectionResults> {
        let today = now.date_naive();
        let mut results = DetectionResults::default();

        if scope.includes(AnomalyKind::Duplicate) {
            results.duplicates = self.detect_duplicates(today, now)?;
        }
        if scope.includes(AnomalyKind::NoCategory) {
            results.no_category = self.detect_no_category(now)?;
        }
        if scope.includes(AnomalyKind::Outlier) {
            results.outliers = self.detect_outliers(today, now)?;
        }

        info!(
            "Detection complete: {} duplicates, {} uncategorized, {} outliers",
            results.duplicates, results.no_category, results.outliers
        );

        Ok(results)
    }

    /// Run every detector
    pub fn run_all(&self, now: DateTime<Utc>) -> Result<DetectionResults> {
        self.run(DetectionScope::All, now)
    }

    fn detect_duplicates(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<usize> {
        let since = lookback_start(today, self.config.duplicate_lookback_months);
        let entries = self.db.list_active_entries_since(since)?;
        debug!(
            "Duplicate scan over {} entries since {}",
            entries.len(),
            since
        );

        let findings = find_duplicates(
            &entries,
            self.config.duplicate_tolerance_days.min(MAX_TOLERANCE_DAYS),
            self.config.duplicate_include_unit,
        );
        self.persist(&findings, now)
    }

    fn detect_no_category(&self, now: DateTime<Utc>) -> Result<usize> {
        let entries = self.db.list_uncategorized_entries()?;
        let findings = find_uncategorized(&entries);
        self.persist(&findings, now)
    }

    fn detect_outliers(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<usize> {
        let since = lookback_start(today, self.config.outlier_lookback_months);
        let entries = self.db.list_active_entries_since(since)?;
        debug!("Outlier scan over {} entries since {}", entries.len(), since);

        let findings = find_outliers(&entries, &self.config);
        self.persist(&findings, now)
    }

    fn persist(&self, findings: &[Finding], now: DateTime<Utc>) -> Result<usize> {
        for finding in findings {
            let id = self
                .db
                .upsert_anomaly(finding, now, self.config.reopen_on_redetect)?;
            debug!(
                "Upserted {} anomaly {} for entries {:?}",
                finding.kind, id, finding.member_entry_ids
            );
        }
        Ok(findings.len())
    }
}
