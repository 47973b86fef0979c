//! Coverage report and reset endpoints (`/v1`).

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use jacoco_coverage_exporter::report::render_report;
use jacoco_coverage_exporter::CoverageScope;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::handlers::run_blocking;
use crate::state::SharedState;

/// Body of a reset request. Absent or empty means every provider.
#[derive(Debug, Default, Deserialize)]
pub struct ApplicationList {
    #[serde(default)]
    pub applications: Vec<String>,
}

impl ApplicationList {
    fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
    }
}

/// Handler for `GET /v1/coverage`.
#[instrument(skip(state))]
pub async fn coverage_handler(State(state): State<SharedState>) -> Response {
    debug!("Processing /v1/coverage request");
    state.health_stats.record_http_request();

    let worker = state.clone();
    let outcome = run_blocking(move || {
        let scope = CoverageScope::new();
        let report = render_report(&scope, &worker.sources);
        (report, scope.close())
    })
    .await;

    match outcome {
        Ok((report, stats)) => {
            state.health_stats.record_scope(stats);
            state.health_stats.record_report(report.is_ok());
            match report {
                Ok(body) => Html(body).into_response(),
                Err(e) => e.into_response(),
            }
        }
        Err(e) => {
            state.health_stats.record_report(false);
            e.into_response()
        }
    }
}

/// Handler for `POST /v1/reset`.
#[instrument(skip(state, body))]
pub async fn reset_handler(State(state): State<SharedState>, body: Bytes) -> Response {
    debug!("Processing /v1/reset request");
    state.health_stats.record_http_request();

    let request = match ApplicationList::parse(&body) {
        Ok(request) => request,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid reset request: {e}")).into_response()
        }
    };

    let worker = state.clone();
    let outcome = run_blocking(move || {
        worker
            .orchestrator
            .reset(&worker.sources, Some(&request.applications))
    })
    .await
    .and_then(|result| result);

    state.health_stats.record_reset(outcome.is_ok());
    match outcome {
        Ok(names) => {
            info!("Reset coverage of {:?}", names);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => e.into_response(),
    }
}
