//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `ledger` - Ledger entry reads and the soft-delete/recategorize writes
//! - `anomalies` - Anomaly store (hash-keyed upsert, status transitions)
//! - `audit` - Audit log of recalculations and resolutions

use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Transaction, TransactionBehavior};
use tracing::info;

use crate::error::Result;

mod anomalies;
mod audit;
mod ledger;

pub use audit::{AuditEntry, AuditEvent};
pub(crate) use audit::record_audit;
pub(crate) use anomalies::{close_anomaly, load_anomaly};
pub(crate) use ledger::{set_category_for_entries, soft_delete_entries};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Format a timestamp the way SQLite's CURRENT_TIMESTAMP does
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Open (or create) the database at `path` and apply migrations
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because every pooled
    /// connection to `:memory:` would see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "sentinel_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run `body` inside a single transaction with all-or-nothing commit
    ///
    /// The transaction is opened with `BEGIN IMMEDIATE`, so the write lock is
    /// held from the first read. Any error returned by `body` rolls back every
    /// statement it executed.
    pub fn run_atomic<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the resolution writer
            -- Note: creates -wal and -shm sidecar files alongside the database
            PRAGMA journal_mode = WAL;

            -- Synchronous NORMAL: good balance of safety and performance
            PRAGMA synchronous = NORMAL;

            -- Store temp tables in memory (faster for grouping queries)
            PRAGMA temp_store = MEMORY;

            -- Ledger entries (postings owned by the ledger CRUD surface)
            CREATE TABLE IF NOT EXISTS ledger_entries (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                posting_date DATE NOT NULL,
                amount REAL NOT NULL,                      -- signed; negative = outflow
                category_id INTEGER,                       -- NULL = uncategorized
                unit_id INTEGER,                           -- organizational unit
                deleted_at DATETIME,                       -- soft delete marker
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_entries_date ON ledger_entries(posting_date);
            CREATE INDEX IF NOT EXISTS idx_ledger_entries_deleted ON ledger_entries(deleted_at);
            CREATE INDEX IF NOT EXISTS idx_ledger_entries_cohort ON ledger_entries(category_id, unit_id);

            -- Anomalies (detected data-quality findings, never deleted)
            CREATE TABLE IF NOT EXISTS anomalies (
                id INTEGER PRIMARY KEY,
                hash TEXT NOT NULL UNIQUE,                 -- identity derived from the condition
                kind TEXT NOT NULL,                        -- DUPLICATE, NO_CATEGORY, OUTLIER
                member_entry_ids TEXT NOT NULL,            -- JSON array of ledger entry ids
                status TEXT NOT NULL DEFAULT 'PENDING',    -- PENDING, RESOLVED, IGNORED
                resolved_at DATETIME,
                notes TEXT,
                details TEXT,                              -- JSON: detector-specific context
                first_detected_at DATETIME NOT NULL,
                last_detected_at DATETIME NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_anomalies_kind ON anomalies(kind);
            CREATE INDEX IF NOT EXISTS idx_anomalies_status ON anomalies(status);

            -- Audit log (recalculations, imports and resolutions)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                user_email TEXT NOT NULL,
                action TEXT NOT NULL,
                anomaly_id INTEGER,                        -- set for resolve/view
                details TEXT                               -- JSON: event-specific fields
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_log_anomaly ON audit_log(anomaly_id);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
