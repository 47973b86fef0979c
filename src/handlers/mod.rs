//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Landing page
//! - `/metrics`: Prometheus metrics endpoint
//! - `/v1/coverage`: Coverage report
//! - `/v1/reset`: Coverage reset
//! - `/health`: Health check endpoint
//! - `/config`: Configuration display endpoint

pub mod config;
pub mod coverage;
pub mod health;
pub mod metrics;
pub mod root;

// Re-export handlers
pub use config::config_handler;
pub use coverage::{coverage_handler, reset_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;

use jacoco_coverage_exporter::CoverageError;

/// Runs blocking coverage work off the async executor.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, CoverageError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CoverageError::InvalidState(format!("Coverage task failed: {e}")))
}
