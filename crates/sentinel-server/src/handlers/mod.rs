//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod anomalies;
pub mod audit;
pub mod detection;
pub mod health;

// Re-export all handlers for use in router
pub use anomalies::*;
pub use audit::*;
pub use detection::*;
pub use health::*;

use axum::extract::Request;
use serde::de::DeserializeOwned;

use crate::{AppError, MAX_BODY_SIZE};

/// Read an optional JSON body. An empty body yields `None`.
pub(crate) async fn read_json_body<T: DeserializeOwned>(
    request: Request,
) -> Result<Option<T>, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))
}
