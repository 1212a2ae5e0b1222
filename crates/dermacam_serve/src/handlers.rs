//! HTTP endpoint handler functions.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use crate::error::ApiError;
use crate::types::{HealthResponse, PredictResponse};
use crate::ServerState;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

async fn read_image(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if bytes.is_empty() {
                return Err(ApiError::EmptyImage);
            }
            return Ok(bytes);
        }
    }
    Err(ApiError::MissingImage)
}

async fn predict(
    state: &Arc<ServerState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictResponse, ApiError> {
    let multipart = multipart.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(e.body_text())
        }
    })?;
    let bytes = read_image(multipart).await?;

    let timeout = state.config.request_timeout;
    let worker = state.clone();
    let task = tokio::task::spawn_blocking(move || worker.service.analyze(&bytes));

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(ApiError::Timeout(timeout)),
        Ok(Err(join)) => Err(ApiError::Internal(join.to_string())),
        Ok(Ok(result)) => Ok(result?.into()),
    }
}

/// `POST /predict`: multipart upload in, top-3 predictions and Grad-CAM out.
pub async fn predict_handler(
    State(state): State<Arc<ServerState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match predict(&state, multipart).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            warn!(status = %err.status(), error = %err.chain(), "Prediction request failed");
            err.into_response_with_details(state.config.expose_error_details)
        }
    }
}

/// `GET /health`.
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        target_layer: state.service.target_layer().to_string(),
        weights: state.service.weights().to_string(),
    })
}
