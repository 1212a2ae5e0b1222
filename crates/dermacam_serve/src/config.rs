//! Service configuration.

use std::net::SocketAddr;
use std::time::Duration;

use dermacam_data::NormalizerConfig;
use dermacam_explain::{GradCamConfig, OverlayConfig};
use serde::{Deserialize, Serialize};

/// Default upload limit (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of ranked predictions returned per request.
pub const TOP_K: usize = 3;

/// Configuration of the prediction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Deadline for one predict+explain; exceeded requests get HTTP 504.
    pub request_timeout: Duration,
    /// Largest accepted request body in bytes; larger uploads get HTTP 413.
    pub max_upload_bytes: usize,
    /// Include the error chain as `details` in error bodies.
    pub expose_error_details: bool,
    /// Image decoding and resizing.
    pub normalizer: NormalizerConfig,
    /// Heatmap computation.
    pub gradcam: GradCamConfig,
    /// Overlay rendering.
    pub overlay: OverlayConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            expose_error_details: false,
            normalizer: NormalizerConfig::default(),
            gradcam: GradCamConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl ServeConfig {
    /// Set the bind address.
    #[must_use]
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Set the request deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the upload limit.
    #[must_use]
    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Toggle error details in responses.
    #[must_use]
    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    /// Set the normalizer configuration.
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }
}
