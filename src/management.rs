//! Embeddable management endpoint for a local provider.
//!
//! Host applications that register a coverage runtime can merge
//! [`management_router`] into their own axum router to expose
//! `POST /actuator/jacoco` with a `{"reset": true}` body.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{CoverageError, Result};
use crate::provider::CoverageSource;

pub const MANAGEMENT_PATH: &str = "/actuator/jacoco";

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WriteOperation {
    #[serde(default)]
    pub reset: bool,
}

pub struct ManagementEndpoint {
    source: Arc<dyn CoverageSource>,
}

impl ManagementEndpoint {
    pub fn new(source: Arc<dyn CoverageSource>) -> Self {
        Self { source }
    }

    /// Resets the provider when `reset` is set. Returns whether it did.
    pub fn write(&self, reset: bool) -> Result<bool> {
        if !reset {
            debug!("Management write without reset flag, nothing to do");
            return Ok(false);
        }
        self.source.reset()?;
        Ok(true)
    }
}

pub fn management_router(endpoint: Arc<ManagementEndpoint>) -> Router {
    Router::new()
        .route(MANAGEMENT_PATH, post(write_handler))
        .with_state(endpoint)
}

#[instrument(skip(endpoint))]
async fn write_handler(
    State(endpoint): State<Arc<ManagementEndpoint>>,
    Json(operation): Json<WriteOperation>,
) -> std::result::Result<StatusCode, CoverageError> {
    let outcome = tokio::task::spawn_blocking(move || endpoint.write(operation.reset))
        .await
        .map_err(|e| CoverageError::InvalidState(format!("reset task failed: {e}")))?;
    outcome?;
    Ok(StatusCode::NO_CONTENT)
}
