//! Reset command implementation.
//!
//! Resets the coverage of the configured providers without starting the server.

use jacoco_coverage_exporter::{build_sources, ArtifactResolver, ResetOrchestrator, StructureMapAnalyzer};
use std::sync::Arc;

use crate::config::Config;

/// Resets `applications` (all providers when empty).
pub fn command_reset(
    applications: Vec<String>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let sources = build_sources(
        &config.providers,
        Arc::new(ArtifactResolver::new(None)),
        Arc::new(StructureMapAnalyzer),
    )?;

    let orchestrator = ResetOrchestrator::new(config.reset_policy());
    let reset = orchestrator.reset(&sources, Some(&applications))?;

    if reset.is_empty() {
        println!("⚠️  No provider matched {:?}", applications);
    } else {
        println!("✅ Coverage reset: {}", reset.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_without_providers_fails() {
        let err = command_reset(vec!["shop".into()], &Config::default()).unwrap_err();
        assert!(err.to_string().contains("No providers have been configured"), "{err}");
    }
}
