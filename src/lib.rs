//! JaCoCo Coverage Exporter Library
//!
//! Collects execution data from running applications that carry the
//! coverage agent, analyzes it against the applications' compiled artifacts
//! and turns the result into hierarchical coverage statistics.
//!
//! # Pipeline
//!
//! - **Fetch**: [`RemoteProvider`] talks to the agent's TCP server, [`LocalProvider`]
//!   uses a runtime registered in this process ([`runtime::register_runtime`])
//! - **Decode**: [`execdata::decode`] parses the execution-data block stream
//! - **Resolve**: [`ArtifactResolver`] expands class locations into artifact files
//! - **Analyze**: a [`StructuralAnalyzer`] produces class nodes, [`analysis::analyze`]
//!   aggregates them into a [`BundleCoverage`]
//! - **Project**: [`CoverageMetrics`] turns bundles into Prometheus gauges,
//!   [`report::render_report`] into a short text report
//!
//! Work is done per request: a [`CoverageScope`] memoizes each provider's
//! bundle for the lifetime of one scrape, report or reset call.
//!
//! # Usage
//!
//! ```rust
//! use jacoco_coverage_exporter::{CoverageScope, CoverageNode, BundleCoverage};
//!
//! let scope = CoverageScope::new();
//! let bundle = scope
//!     .get_or_compute("shop", || Ok(BundleCoverage::new("shop", vec![])))
//!     .unwrap();
//! assert_eq!(bundle.name(), "shop");
//! scope.close();
//! ```

pub mod analysis;
pub mod coverage;
pub mod error;
pub mod execdata;
pub mod management;
pub mod pattern;
pub mod projector;
pub mod provider;
pub mod remote;
pub mod report;
pub mod reset;
pub mod resolver;
pub mod runtime;
pub mod scope;

// Re-export main types for convenience
pub use analysis::{StructuralAnalyzer, StructureMapAnalyzer};
pub use coverage::{
    BundleCoverage, ClassCoverage, Counter, CounterEntity, CounterSet, CoverageNode, ElementType,
    MethodCoverage, PackageCoverage,
};
pub use error::{CoverageError, Result};
pub use execdata::{ExecutionDataStore, ExecutionRecord};
pub use management::{management_router, ManagementEndpoint};
pub use projector::{CoverageMetrics, Projection};
pub use provider::{build_sources, CoverageSource, LocalProvider, ProviderConfig, RemoteProvider};
pub use reset::{ResetOrchestrator, ResetPolicy};
pub use resolver::ArtifactResolver;
pub use runtime::CoverageRuntime;
pub use scope::CoverageScope;
