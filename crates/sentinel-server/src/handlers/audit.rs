//! Audit log handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState, MAX_PAGE_LIMIT};
use sentinel_core::AuditEntry;

/// Query parameters for the audit log
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
    /// Restrict to the history of one anomaly (oldest first, unpaginated)
    pub anomaly_id: Option<i64>,
}

fn default_audit_limit() -> i64 {
    100
}

/// GET /api/audit - Recent audit entries, or one anomaly's history with `?anomalyId=`
pub async fn list_audit_log(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    if let Some(anomaly_id) = params.anomaly_id {
        if state.db.get_anomaly(anomaly_id)?.is_none() {
            return Err(AppError::not_found(&format!(
                "Anomaly {} not found",
                anomaly_id
            )));
        }
        return Ok(Json(state.db.anomaly_history(anomaly_id)?));
    }

    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    Ok(Json(state.db.list_audit_log(limit)?))
}
