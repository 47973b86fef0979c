//! Reset orchestration across providers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{CoverageError, Result};
use crate::provider::CoverageSource;

/// What to do when one provider's reset fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Stop at the first failure; later providers are left untouched.
    #[default]
    FailFast,
    /// Reset every selected provider, then report all failures together.
    BestEffort,
}

pub const NO_PROVIDERS_MESSAGE: &str =
    "No providers have been configured, please add providers to collect the coverage from!";

/// Fails with a configuration error when nothing is configured.
pub fn ensure_providers(sources: &[Arc<dyn CoverageSource>]) -> Result<()> {
    if sources.is_empty() {
        return Err(CoverageError::Configuration(NO_PROVIDERS_MESSAGE.into()));
    }
    Ok(())
}

/// Picks the sources named in `selected`, or all of them when the selection
/// is absent or empty. Configuration order is kept.
pub fn select<'a>(
    sources: &'a [Arc<dyn CoverageSource>],
    selected: Option<&[String]>,
) -> Vec<&'a Arc<dyn CoverageSource>> {
    match selected {
        Some(names) if !names.is_empty() => {
            for name in names {
                if !sources.iter().any(|s| s.name() == name) {
                    debug!("Ignoring unknown provider [{}] in reset request", name);
                }
            }
            sources
                .iter()
                .filter(|s| names.iter().any(|n| n == s.name()))
                .collect()
        }
        _ => sources.iter().collect(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResetOrchestrator {
    policy: ResetPolicy,
}

impl ResetOrchestrator {
    pub fn new(policy: ResetPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }

    /// Resets the selected providers sequentially and returns their names.
    pub fn reset(
        &self,
        sources: &[Arc<dyn CoverageSource>],
        selected: Option<&[String]>,
    ) -> Result<Vec<String>> {
        ensure_providers(sources)?;

        let targets = select(sources, selected);
        let mut done = Vec::with_capacity(targets.len());
        let mut failures = Vec::new();

        for source in targets {
            match source.reset() {
                Ok(()) => done.push(source.name().to_string()),
                Err(e) => match self.policy {
                    ResetPolicy::FailFast => {
                        warn!("Reset of [{}] failed, aborting: {}", source.name(), e);
                        return Err(e);
                    }
                    ResetPolicy::BestEffort => {
                        warn!("Reset of [{}] failed: {}", source.name(), e);
                        failures.push((source.name().to_string(), e));
                    }
                },
            }
        }

        if !failures.is_empty() {
            return Err(CoverageError::Reset(failures));
        }

        info!("Coverage reset for {} provider(s)", done.len());
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::BundleCoverage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fake {
        name: String,
        fail: bool,
        resets: AtomicUsize,
    }

    impl Fake {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                fail,
                resets: AtomicUsize::new(0),
            })
        }
    }

    impl CoverageSource for Fake {
        fn name(&self) -> &str {
            &self.name
        }
        fn fetch(&self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn reset(&self) -> Result<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CoverageError::connection(&self.name, "down"))
            } else {
                Ok(())
            }
        }
        fn analyze(&self, _data: &[u8]) -> Result<BundleCoverage> {
            Ok(BundleCoverage::new(self.name.clone(), vec![]))
        }
    }

    fn as_sources(fakes: &[Arc<Fake>]) -> Vec<Arc<dyn CoverageSource>> {
        fakes.iter().map(|f| f.clone() as Arc<dyn CoverageSource>).collect()
    }

    #[test]
    fn test_empty_selection_resets_all() {
        let fakes = [Fake::new("a", false), Fake::new("b", false)];
        let done = ResetOrchestrator::default()
            .reset(&as_sources(&fakes), Some(&[]))
            .unwrap();
        assert_eq!(done, vec!["a", "b"]);
    }

    #[test]
    fn test_fail_fast_stops_early() {
        let fakes = [Fake::new("a", true), Fake::new("b", false)];
        let result = ResetOrchestrator::new(ResetPolicy::FailFast).reset(&as_sources(&fakes), None);
        assert!(matches!(result, Err(CoverageError::Connection { .. })));
        assert_eq!(fakes[1].resets.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_best_effort_collects_failures() {
        let fakes = [Fake::new("a", true), Fake::new("b", false), Fake::new("c", true)];
        let err = ResetOrchestrator::new(ResetPolicy::BestEffort)
            .reset(&as_sources(&fakes), None)
            .unwrap_err();
        match err {
            CoverageError::Reset(failures) => {
                let names: Vec<&str> = failures.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["a", "c"]);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(fakes[1].resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_names_ignored() {
        let fakes = [Fake::new("a", false)];
        let done = ResetOrchestrator::default()
            .reset(&as_sources(&fakes), Some(&["zzz".to_string()]))
            .unwrap();
        assert!(done.is_empty());
        assert_eq!(fakes[0].resets.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_providers_is_a_configuration_error() {
        let orchestrator = ResetOrchestrator::default();
        let names = vec!["a".to_string()];
        for selected in [None, Some(names.as_slice())] {
            let err = orchestrator.reset(&[], selected).unwrap_err();
            assert!(matches!(err, CoverageError::Configuration(_)), "{err}");
        }
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        let policy: ResetPolicy = serde_json::from_str("\"best_effort\"").unwrap();
        assert_eq!(policy, ResetPolicy::BestEffort);
    }
}
