//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers.

use jacoco_coverage_exporter::{ArtifactResolver, CoverageMetrics, CoverageSource, ResetOrchestrator};
use prometheus::{Gauge, Registry};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::health_stats::HealthStats;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    /// Exporter self-metrics; coverage gauges are built per scrape.
    pub registry: Registry,
    pub coverage_metrics: CoverageMetrics,
    pub scrape_duration: Gauge,
    pub sources: Vec<Arc<dyn CoverageSource>>,
    pub resolver: Arc<ArtifactResolver>,
    pub orchestrator: ResetOrchestrator,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
