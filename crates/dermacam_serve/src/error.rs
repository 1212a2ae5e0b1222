//! Error types for dermacam_serve.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dermacam_core::{CoreError, PixelScale};
use dermacam_data::DataError;
use dermacam_explain::ExplainError;
use thiserror::Error;

use crate::types::ErrorBody;

/// A failed pipeline stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The upload is not a decodable image.
    #[error("Failed to decode image")]
    Decode(#[source] DataError),

    /// The decoded image could not be brought to the model input shape.
    #[error("Failed to preprocess image")]
    Preprocess(#[source] DataError),

    /// The classifier forward pass failed.
    #[error("Prediction failed")]
    Prediction(#[source] CoreError),

    /// Grad-CAM or overlay rendering failed.
    #[error("Failed to generate explanation")]
    Explanation(#[source] ExplainError),
}

impl From<ExplainError> for PipelineError {
    fn from(err: ExplainError) -> Self {
        match err {
            ExplainError::Classifier(core) => Self::Prediction(core),
            other => Self::Explanation(other),
        }
    }
}

impl From<DataError> for PipelineError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Decode(_) | DataError::UnsupportedMode(_) => Self::Decode(err),
            DataError::Preprocess(_) | DataError::CoreError(_) => Self::Preprocess(err),
        }
    }
}

/// Errors raised while starting the service.
#[derive(Error, Debug)]
pub enum ServeError {
    /// Normalizer output and classifier input disagree in pixel scale.
    #[error("Normalizer produces {normalizer} pixels but the classifier expects {classifier}")]
    ScaleMismatch {
        /// Scale the normalizer is configured with.
        normalizer: PixelScale,
        /// Scale the classifier declares.
        classifier: PixelScale,
    },

    /// Binding or serving failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned to HTTP clients.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No `image` field in the multipart body.
    #[error("No image uploaded")]
    MissingImage,

    /// The `image` field is empty.
    #[error("Uploaded image is empty")]
    EmptyImage,

    /// The body is not valid multipart data.
    #[error("Invalid multipart request")]
    BadRequest(String),

    /// The body exceeds the upload limit.
    #[error("Upload exceeds the size limit")]
    PayloadTooLarge,

    /// A pipeline stage failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The request missed its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The worker running the request failed.
    #[error("Internal error")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingImage | Self::EmptyImage | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Pipeline(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Full cause chain, outermost first.
    pub fn chain(&self) -> String {
        let mut parts = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            parts.push(err.to_string());
            source = err.source();
        }
        match self {
            Self::BadRequest(detail) | Self::Internal(detail) => parts.push(detail.clone()),
            _ => {}
        }
        parts.join(": ")
    }

    /// Render as a response, optionally including the cause chain.
    pub fn into_response_with_details(self, expose_details: bool) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
            details: expose_details.then(|| self.chain()),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_response_with_details(false)
    }
}
