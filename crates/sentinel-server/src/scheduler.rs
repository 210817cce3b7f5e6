//! Background task scheduler for periodic anomaly recalculation
//!
//! Enabled via environment variables:
//!
//! - `SENTINEL_DETECT_SCHEDULE`: Interval in hours (e.g., "1" for hourly, "24" for daily)
//!
//! Each tick runs every detector over the current ledger. Findings are upserted
//! by hash, so overlapping with a manual recalculation is harmless.

use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use sentinel_core::{
    AnomalyDetector, AuditEvent, Database, DetectionConfig, DetectionResults, DetectionScope,
};

/// Configuration for scheduled recalculation
#[derive(Debug, Clone)]
pub struct DetectionScheduleConfig {
    /// Interval between runs in hours
    pub interval_hours: u64,
}

impl DetectionScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if scheduling is not configured (SENTINEL_DETECT_SCHEDULE not set)
    pub fn from_env() -> Option<Self> {
        let interval_hours: u64 = std::env::var("SENTINEL_DETECT_SCHEDULE")
            .ok()
            .and_then(|s| s.trim().parse().ok())?;

        if interval_hours == 0 {
            warn!("SENTINEL_DETECT_SCHEDULE is 0, scheduled recalculation disabled");
            return None;
        }

        Some(Self { interval_hours })
    }
}

/// Start the recalculation scheduler as a background task
///
/// Spawns a tokio task that runs indefinitely, recalculating every
/// `interval_hours`.
pub fn start_detection_scheduler(
    db: Database,
    detection: DetectionConfig,
    config: DetectionScheduleConfig,
) {
    info!(
        "Starting detection scheduler: every {} hours",
        config.interval_hours
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_hours * 3600));

        // Skip the first immediate tick - startup doesn't trigger a run
        ticker.tick().await;

        loop {
            ticker.tick().await;

            info!("Running scheduled recalculation...");

            let db = db.clone();
            let detection = detection.clone();
            let outcome =
                tokio::task::spawn_blocking(move || run_scheduled_detection(&db, detection)).await;

            match outcome {
                Ok(Ok(results)) => {
                    info!(
                        "Scheduled recalculation completed: {} anomalies",
                        results.total()
                    );
                }
                Ok(Err(e)) => {
                    error!("Scheduled recalculation failed: {}", e);
                }
                Err(e) => {
                    error!("Scheduled recalculation task panicked: {}", e);
                }
            }
        }
    });
}

/// Run a single scheduled recalculation
fn run_scheduled_detection(
    db: &Database,
    detection: DetectionConfig,
) -> Result<DetectionResults, String> {
    let results = AnomalyDetector::with_config(db, detection)
        .run_all(Utc::now())
        .map_err(|e| format!("Detection failed: {}", e))?;

    // Log to audit (as "scheduler" user)
    if let Err(e) = db.log_audit(
        "scheduler",
        &AuditEvent::Recalculate {
            scope: DetectionScope::All,
            results,
            scheduled: true,
        },
    ) {
        warn!("Failed to log scheduled recalculation to audit: {}", e);
    }

    Ok(results)
}
