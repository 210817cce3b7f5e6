//! Recalculation handler

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::read_json_body;
use crate::{get_user_email, AppError, AppState};
use sentinel_core::{AnomalyDetector, AuditEvent, DetectionResults, DetectionScope};

/// Recalculation request parameters
#[derive(Debug, Default, Deserialize)]
pub struct RecalculateRequest {
    #[serde(default)]
    pub scope: Option<String>,
}

/// Recalculation response: per-kind counts of anomalies created or refreshed
#[derive(Serialize)]
pub struct RecalculateResponse {
    pub success: bool,
    #[serde(flatten)]
    pub results: DetectionResults,
}

/// POST /api/anomalies/recalculate - Run anomaly detection
pub async fn recalculate(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<RecalculateResponse>, AppError> {
    let user_email = get_user_email(request.headers());
    let params: RecalculateRequest = read_json_body(request).await?.unwrap_or_default();

    let scope = match params.scope.as_deref() {
        None | Some("") => DetectionScope::All,
        Some(s) => s
            .parse::<DetectionScope>()
            .map_err(|e| AppError::bad_request(&e))?,
    };

    let detector = AnomalyDetector::with_config(&state.db, state.detection.clone());
    let results = detector.run(scope, Utc::now())?;

    info!(
        "Recalculation ({}) by {}: {} anomalies",
        scope.as_str(),
        user_email,
        results.total()
    );

    // Audit log
    state.db.log_audit(
        &user_email,
        &AuditEvent::Recalculate {
            scope,
            results,
            scheduled: false,
        },
    )?;

    Ok(Json(RecalculateResponse {
        success: true,
        results,
    }))
}
