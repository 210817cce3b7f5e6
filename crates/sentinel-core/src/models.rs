//! Domain models for Sentinel

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A posted financial transaction in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    pub description: String,
    pub posting_date: NaiveDate,
    /// Signed amount; negative values are outflows
    pub amount: f64,
    pub category_id: Option<i64>,
    /// Organizational unit the posting belongs to
    pub unit_id: Option<i64>,
    /// Set when the entry has been soft-deleted
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// New ledger entry for insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLedgerEntry {
    pub description: String,
    pub posting_date: NaiveDate,
    pub amount: f64,
    pub category_id: Option<i64>,
    pub unit_id: Option<i64>,
}

/// What kind of data-quality condition an anomaly records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    Duplicate,
    NoCategory,
    Outlier,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "DUPLICATE",
            Self::NoCategory => "NO_CATEGORY",
            Self::Outlier => "OUTLIER",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "Duplicate Posting",
            Self::NoCategory => "Missing Category",
            Self::Outlier => "Abnormal Amount",
        }
    }
}

impl std::str::FromStr for AnomalyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "DUPLICATE" | "DUPLICATES" => Ok(Self::Duplicate),
            "NO_CATEGORY" | "NOCATEGORY" => Ok(Self::NoCategory),
            "OUTLIER" | "OUTLIERS" => Ok(Self::Outlier),
            _ => Err(format!("Unknown anomaly kind: {}", s)),
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Anomaly lifecycle status. `Resolved` and `Ignored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyStatus {
    #[default]
    Pending,
    Resolved,
    Ignored,
}

impl AnomalyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Resolved => "RESOLVED",
            Self::Ignored => "IGNORED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for AnomalyStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RESOLVED" => Ok(Self::Resolved),
            "IGNORED" => Ok(Self::Ignored),
            _ => Err(format!("Unknown anomaly status: {}", s)),
        }
    }
}

impl std::fmt::Display for AnomalyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable record of a detected condition in the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: i64,
    /// Stable identity derived from the condition itself
    pub hash: String,
    pub kind: AnomalyKind,
    /// Ledger entries implicated in the finding (weak references)
    pub member_entry_ids: Vec<i64>,
    pub status: AnomalyStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Detector-specific context (bucket key, cohort statistics)
    pub details: Option<serde_json::Value>,
    pub first_detected_at: DateTime<Utc>,
    pub last_detected_at: DateTime<Utc>,
}

/// Output of a detector, ready to be upserted into the anomaly store
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub kind: AnomalyKind,
    pub hash: String,
    pub member_entry_ids: Vec<i64>,
    pub details: serde_json::Value,
}
