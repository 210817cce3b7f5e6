//! Sentinel Web Server
//!
//! Axum-based REST API for ledger anomaly detection and resolution.
//!
//! - Recalculation of anomalies (all detectors or one scope)
//! - Anomaly listing, lookup and resolution
//! - Audit logging of every recalculation and resolution
//! - Optional periodic recalculation (see [`DetectionScheduleConfig`])
//! - Sanitized error responses
//!
//! The server does not authenticate. The acting user recorded in the audit
//! log is taken from the `x-user-email` header.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use sentinel_core::{Database, DetectionConfig};

mod handlers;
mod scheduler;

pub use scheduler::{start_detection_scheduler, DetectionScheduleConfig};

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Maximum accepted JSON body size (64 KB)
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Header carrying the acting user's email
const USER_EMAIL_HEADER: &str = "x-user-email";

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// Thresholds and windows used by recalculation
    pub detection: DetectionConfig,
}

/// Extract user email from request headers (for audit logging)
/// Returns the `x-user-email` header value, or "local-dev" when absent
pub fn get_user_email(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("local-dev")
        .to_string()
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    create_router_with_options(db, config, DetectionConfig::from_env())
}

/// Create the application router with an explicit detection config (for testing)
pub fn create_router_with_options(
    db: Database,
    config: ServerConfig,
    detection: DetectionConfig,
) -> Router {
    let cors = build_cors(&config);

    let state = Arc::new(AppState {
        db,
        config,
        detection,
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Anomalies
        .route("/anomalies", get(handlers::list_anomalies))
        .route("/anomalies/recalculate", post(handlers::recalculate))
        .route("/anomalies/resolve", post(handlers::resolve))
        .route("/anomalies/:id", get(handlers::get_anomaly))
        // Audit log
        .route("/audit", get(handlers::list_audit_log));

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn build_cors(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(USER_EMAIL_HEADER),
        ]);

    if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        cors
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Start the server
pub async fn serve(db: Database, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(db, host, port, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let detection = DetectionConfig::from_env();

    // Start recalculation scheduler if configured
    if let Some(schedule) = DetectionScheduleConfig::from_env() {
        start_detection_scheduler(db.clone(), detection.clone(), schedule);
    }

    let app = create_router_with_options(db, config, detection);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<sentinel_core::Error> for AppError {
    fn from(err: sentinel_core::Error) -> Self {
        use sentinel_core::Error;

        match err {
            Error::Validation(msg) | Error::InvalidData(msg) => Self::bad_request(&msg),
            Error::NotFound(what) => Self::not_found(&format!("Not found: {}", what)),
            Error::AlreadyResolved(id) => {
                Self::conflict(&format!("Anomaly {} is already resolved", id))
            }
            other => Self::internal(other),
        }
    }
}
