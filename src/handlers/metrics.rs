//! Metrics endpoint handler for Prometheus scraping.
//!
//! Every scrape opens a fresh coverage scope, evaluates the coverage gauges
//! of all providers through it and appends the exporter's own metrics.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use jacoco_coverage_exporter::CoverageScope;
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::handlers::run_blocking;
use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    CollectionFailed,
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        let message = match self {
            MetricsError::CollectionFailed => "Failed to collect coverage metrics",
            MetricsError::EncodingFailed => "Failed to encode metrics",
        };
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");
    state.health_stats.record_http_request();

    let worker = state.clone();
    let (projection, scope_stats) = run_blocking(move || {
        let scope = CoverageScope::new();
        let projection = worker.coverage_metrics.collect(&scope, &worker.sources);
        (projection, scope.close())
    })
    .await
    .map_err(|e| {
        error!("Coverage collection failed: {}", e);
        MetricsError::CollectionFailed
    })?;

    let up = projection.providers_up;
    let mut families = projection.families;
    let elapsed = start.elapsed().as_secs_f64();
    state.scrape_duration.set(elapsed);
    state.health_stats.record_scope(scope_stats);
    state
        .health_stats
        .record_scrape(elapsed, up, state.sources.len());

    families.extend(state.registry.gather());

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    let encoder = TextEncoder::new();

    if encoder.encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    debug!(
        "Metrics request completed: {}/{} providers up, {} bytes, {:.3}s",
        up,
        state.sources.len(),
        buffer.len(),
        elapsed
    );

    String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)
}
