//! Error taxonomy for coverage collection.
//!
//! Every failure that can happen between an inbound request and the
//! resulting coverage tree is expressed as a [`CoverageError`]. None of them
//! are retried internally; they bubble up to the triggering request.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, CoverageError>;

/// Errors raised while collecting, decoding or analyzing coverage.
///
/// Variants carry rendered messages rather than source errors so that a
/// failure can be memoized inside a [`crate::CoverageScope`] and replayed
/// to every gauge of the same provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoverageError {
    /// No providers configured, or a provider definition is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The monitored instance could not be reached or did not answer properly.
    #[error("Connection to {address} failed: {reason}")]
    Connection { address: String, reason: String },

    /// Malformed, truncated or incompatible execution-data stream.
    #[error("Invalid execution data: {0}")]
    Decode(String),

    /// An artifact could not be processed by the structural analyzer.
    #[error("Failed to analyze {path}: {reason}")]
    Analysis { path: String, reason: String },

    /// A local runtime handle resolved to something unexpected.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Best-effort reset finished with at least one failing provider.
    #[error("Reset failed for {} provider(s): {}", .0.len(), render_failures(.0))]
    Reset(Vec<(String, CoverageError)>),
}

fn render_failures(failures: &[(String, CoverageError)]) -> String {
    failures
        .iter()
        .map(|(name, e)| format!("[{name}] {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl CoverageError {
    pub(crate) fn connection(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        CoverageError::Connection {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn analysis(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        CoverageError::Analysis {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error originates from configuration rather than runtime state.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CoverageError::Configuration(_))
    }

    /// HTTP status a failed request surfaces with.
    pub fn status_code(&self) -> StatusCode {
        if self.is_configuration() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for CoverageError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);
        (self.status_code(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_error_lists_every_failure() {
        let err = CoverageError::Reset(vec![
            ("a".into(), CoverageError::connection("a:6300", "refused")),
            ("c".into(), CoverageError::InvalidState("boom".into())),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("Reset failed for 2 provider(s)"));
        assert!(msg.contains("[a] Connection to a:6300 failed: refused"));
        assert!(msg.contains("[c] Invalid state: boom"));
    }

    #[test]
    fn test_is_configuration() {
        assert!(CoverageError::Configuration("x".into()).is_configuration());
        assert!(!CoverageError::Decode("x".into()).is_configuration());
    }
}
