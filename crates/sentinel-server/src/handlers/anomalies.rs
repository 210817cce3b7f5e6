//! Anomaly listing and resolution handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::read_json_body;
use crate::{get_user_email, AppError, AppState};
use sentinel_core::{
    resolve_anomaly, Anomaly, AnomalyKind, AnomalyStatus, AuditEvent, ResolutionAction,
    ResolutionPayload, ResolutionSummary,
};

/// Query parameters for listing anomalies
#[derive(Debug, Deserialize)]
pub struct AnomalyQuery {
    pub status: Option<String>,
    pub kind: Option<String>,
}

/// GET /api/anomalies - List anomalies, optionally filtered by status and kind
pub async fn list_anomalies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnomalyQuery>,
    request: Request,
) -> Result<Json<Vec<Anomaly>>, AppError> {
    let user_email = get_user_email(request.headers());

    let status: Option<AnomalyStatus> = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<AnomalyStatus>())
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;
    let kind: Option<AnomalyKind> = params
        .kind
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<AnomalyKind>())
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;

    let anomalies = state.db.list_anomalies(status, kind)?;

    state.db.log_audit(
        &user_email,
        &AuditEvent::ListAnomalies {
            status,
            kind,
            count: anomalies.len(),
        },
    )?;

    Ok(Json(anomalies))
}

/// GET /api/anomalies/:id - Get a single anomaly
pub async fn get_anomaly(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Anomaly>, AppError> {
    let user_email = get_user_email(request.headers());

    let anomaly = state
        .db
        .get_anomaly(id)?
        .ok_or_else(|| AppError::not_found(&format!("Anomaly {} not found", id)))?;

    state
        .db
        .log_audit(&user_email, &AuditEvent::ViewAnomaly { anomaly_id: id })?;

    Ok(Json(anomaly))
}

/// Resolution request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub anomaly_id: Option<i64>,
    pub action: Option<String>,
    #[serde(default)]
    pub payload: Option<ResolutionPayload>,
}

/// Resolution response
#[derive(Serialize)]
pub struct ResolveResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: ResolutionSummary,
}

/// POST /api/anomalies/resolve - Apply a decision to one anomaly
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ResolveResponse>, AppError> {
    let user_email = get_user_email(request.headers());

    let req: ResolveRequest = read_json_body(request)
        .await?
        .ok_or_else(|| AppError::bad_request("Request body is required"))?;

    let anomaly_id = req
        .anomaly_id
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::bad_request("anomalyId is required"))?;
    let action: ResolutionAction = req
        .action
        .as_deref()
        .ok_or_else(|| AppError::bad_request("action is required"))?
        .parse()?;
    let payload = req.payload.unwrap_or_default();

    // Audited inside the resolution transaction
    let summary = resolve_anomaly(
        &state.db,
        &user_email,
        anomaly_id,
        action,
        &payload,
        Utc::now(),
    )?;

    Ok(Json(ResolveResponse {
        success: true,
        summary,
    }))
}
