//! # dermacam_serve
//!
//! HTTP front end for dermacam.
//!
//! Endpoints:
//! - `POST /predict` - multipart field `image`; returns the top-3 lesion
//!   classes and a Grad-CAM heatmap with a rendered overlay
//! - `GET /health` - liveness, version, target layer and weight origin
//!
//! Every failure is a JSON `{"error": ...}` body: 400 for a missing or
//! empty upload, 413 above the upload limit, 500 for pipeline failures and
//! 504 past the request deadline.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
mod error;
pub mod handlers;
pub mod service;
pub mod types;

pub use config::ServeConfig;
pub use error::{ApiError, PipelineError, ServeError};
pub use handlers::{health_handler, predict_handler};
pub use service::{BoxedClassifier, Diagnosis, DiagnosisService};
pub use types::{ErrorBody, Explanations, HealthResponse, PredictResponse};

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by all handlers.
#[derive(Debug)]
pub struct ServerState {
    /// Service configuration.
    pub config: ServeConfig,
    /// The pipeline.
    pub service: DiagnosisService,
}

impl ServerState {
    /// Bundle a service with its configuration.
    pub fn new(config: ServeConfig, service: DiagnosisService) -> Self {
        Self { config, service }
    }
}

/// Build the application router.
pub fn router(state: Arc<ServerState>) -> Router {
    // CORS layer: the browser frontend is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/predict", post(handlers::predict_handler))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until SIGINT/SIGTERM.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> Result<(), ServeError> {
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

/// Bind `config.bind_addr` and serve.
pub async fn run_server(state: Arc<ServerState>) -> Result<(), ServeError> {
    let bind_addr = state.config.bind_addr;
    let listener = TcpListener::bind(bind_addr).await?;
    info!(
        bind = %listener.local_addr()?,
        layer = %state.service.target_layer(),
        weights = state.service.weights(),
        "dermacam server listening"
    );
    info!("Endpoints: GET /health, POST /predict");
    serve(listener, state).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down gracefully"),
        _ = terminate => info!("received SIGTERM, shutting down gracefully"),
    }
}
