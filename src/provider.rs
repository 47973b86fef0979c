//! Coverage providers.
//!
//! A provider is one monitored application. Two variants exist: remote
//! providers talk to the agent over TCP for every call, local providers use
//! a runtime registered inside the current process. Both are consumed
//! through [`CoverageSource`], so the scope, projector and reset code never
//! know which one they hold.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::analysis::{self, StructuralAnalyzer};
use crate::coverage::BundleCoverage;
use crate::error::{CoverageError, Result};
use crate::execdata;
use crate::remote::RemoteClient;
use crate::resolver::{ArtifactResolver, ArtifactSpec};
use crate::runtime::{self, CoverageRuntime, RUNTIME_OBJECT_NAME};

pub const DEFAULT_CLASSES_LOCATION: &str = "/app/classes/";

fn default_classes_locations() -> Vec<PathBuf> {
    vec![PathBuf::from(DEFAULT_CLASSES_LOCATION)]
}

fn default_include_patterns() -> Vec<String> {
    vec![
        "glob:**.class".to_string(),
        "glob:**.jar".to_string(),
        "glob:**.classmap.json".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

/// Addressing and artifact settings of one monitored application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Cache key and value of the `application` label.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Use the runtime registered in this process instead of a remote agent.
    #[serde(default)]
    pub local: bool,

    #[serde(default = "default_classes_locations")]
    pub classes_locations: Vec<PathBuf>,
    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Memoize the resolved artifact list across requests.
    #[serde(default = "default_true")]
    pub enable_classes_cache: bool,

    /// Connect/read timeout for remote calls. Unset means transport defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl ProviderConfig {
    pub fn remote(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: Some(host.into()),
            port: Some(port),
            local: false,
            classes_locations: default_classes_locations(),
            include_patterns: default_include_patterns(),
            exclude_patterns: Vec::new(),
            enable_classes_cache: true,
            timeout_seconds: None,
        }
    }

    pub fn local(name: impl Into<String>) -> Self {
        Self {
            host: None,
            port: None,
            local: true,
            ..Self::remote(name, "", 0)
        }
    }

    /// `host:port`, if both are set.
    pub fn address(&self) -> Option<String> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Some(format!("{host}:{port}")),
            _ => None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoverageError::Configuration(
                "Provider name must not be empty".into(),
            ));
        }
        if !self.local {
            match (&self.host, self.port) {
                (Some(host), Some(_)) if !host.trim().is_empty() => {}
                _ => {
                    return Err(CoverageError::Configuration(format!(
                        "Provider '{}' needs host and port unless local is set",
                        self.name
                    )))
                }
            }
        }
        // Compiles every pattern.
        ArtifactSpec::from_config(self)?;
        Ok(())
    }
}

/// Validates a provider list: every entry on its own, names unique.
pub fn validate_providers(providers: &[ProviderConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for provider in providers {
        provider.validate()?;
        if !seen.insert(provider.name.as_str()) {
            return Err(CoverageError::Configuration(format!(
                "Duplicate provider name '{}'",
                provider.name
            )));
        }
    }
    Ok(())
}

/// The capability set every provider variant offers.
pub trait CoverageSource: Send + Sync {
    fn name(&self) -> &str;

    /// Raw execution data, without resetting the agent.
    fn fetch(&self) -> Result<Vec<u8>>;

    fn reset(&self) -> Result<()>;

    /// Decodes `data` and analyzes it against this provider's artifacts.
    fn analyze(&self, data: &[u8]) -> Result<BundleCoverage>;

    /// Full pipeline: fetch, decode, resolve, analyze.
    fn coverage(&self) -> Result<BundleCoverage> {
        let data = self.fetch()?;
        self.analyze(&data)
    }
}

/// Artifact side of a provider, shared by both variants.
pub struct ArtifactAnalysis {
    spec: ArtifactSpec,
    resolver: Arc<ArtifactResolver>,
    analyzer: Arc<dyn StructuralAnalyzer>,
}

impl ArtifactAnalysis {
    pub fn new(
        config: &ProviderConfig,
        resolver: Arc<ArtifactResolver>,
        analyzer: Arc<dyn StructuralAnalyzer>,
    ) -> Result<Self> {
        Ok(Self {
            spec: ArtifactSpec::from_config(config)?,
            resolver,
            analyzer,
        })
    }

    pub fn analyze(&self, data: &[u8]) -> Result<BundleCoverage> {
        let store = execdata::decode(data)?;
        let artifacts = self.resolver.resolve(&self.spec);
        debug!(
            "Provider [{}]: {} execution records, {} artifacts",
            self.spec.name,
            store.len(),
            artifacts.len()
        );
        analysis::analyze(&self.spec.name, &store, &artifacts, self.analyzer.as_ref())
    }
}

/// Provider backed by an agent reachable over TCP.
pub struct RemoteProvider {
    name: String,
    client: RemoteClient,
    artifacts: ArtifactAnalysis,
}

impl RemoteProvider {
    pub fn new(
        config: &ProviderConfig,
        resolver: Arc<ArtifactResolver>,
        analyzer: Arc<dyn StructuralAnalyzer>,
    ) -> Result<Self> {
        let address = config.address().ok_or_else(|| {
            CoverageError::Configuration(format!(
                "Provider '{}' has no remote address",
                config.name
            ))
        })?;
        Ok(Self {
            name: config.name.clone(),
            client: RemoteClient::new(address, config.timeout()),
            artifacts: ArtifactAnalysis::new(config, resolver, analyzer)?,
        })
    }

    pub fn address(&self) -> &str {
        self.client.address()
    }
}

impl CoverageSource for RemoteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Vec<u8>> {
        self.client.fetch(false)
    }

    fn reset(&self) -> Result<()> {
        self.client.reset()?;
        info!("Coverage of [{}] reset at {}", self.name, self.client.address());
        Ok(())
    }

    fn analyze(&self, data: &[u8]) -> Result<BundleCoverage> {
        self.artifacts.analyze(data)
    }
}

/// Provider backed by a runtime registered in this process.
///
/// The runtime handle is looked up on first use and kept afterwards.
pub struct LocalProvider {
    name: String,
    object_name: String,
    runtime: OnceCell<Arc<dyn CoverageRuntime>>,
    artifacts: ArtifactAnalysis,
}

impl LocalProvider {
    pub fn new(
        config: &ProviderConfig,
        resolver: Arc<ArtifactResolver>,
        analyzer: Arc<dyn StructuralAnalyzer>,
    ) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            object_name: RUNTIME_OBJECT_NAME.to_string(),
            runtime: OnceCell::new(),
            artifacts: ArtifactAnalysis::new(config, resolver, analyzer)?,
        })
    }

    /// Looks the runtime up under `object_name` instead of the default name.
    pub fn with_object_name(mut self, object_name: impl Into<String>) -> Self {
        self.object_name = object_name.into();
        self
    }

    fn runtime(&self) -> Result<&Arc<dyn CoverageRuntime>> {
        self.runtime
            .get_or_try_init(|| runtime::resolve_runtime(&self.object_name))
    }
}

impl CoverageSource for LocalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Vec<u8>> {
        self.runtime()?.execution_data(false)
    }

    fn reset(&self) -> Result<()> {
        self.runtime()?.reset()?;
        info!("Coverage of local provider [{}] reset", self.name);
        Ok(())
    }

    fn analyze(&self, data: &[u8]) -> Result<BundleCoverage> {
        self.artifacts.analyze(data)
    }
}

/// Builds one source per configured provider, in configuration order.
pub fn build_sources(
    configs: &[ProviderConfig],
    resolver: Arc<ArtifactResolver>,
    analyzer: Arc<dyn StructuralAnalyzer>,
) -> Result<Vec<Arc<dyn CoverageSource>>> {
    validate_providers(configs)?;

    configs
        .iter()
        .map(|config| -> Result<Arc<dyn CoverageSource>> {
            if config.local {
                Ok(Arc::new(LocalProvider::new(
                    config,
                    resolver.clone(),
                    analyzer.clone(),
                )?))
            } else {
                Ok(Arc::new(RemoteProvider::new(
                    config,
                    resolver.clone(),
                    analyzer.clone(),
                )?))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StructureMapAnalyzer;

    #[test]
    fn test_defaults_from_minimal_yaml() {
        let cfg: ProviderConfig = serde_yaml::from_str("name: shop\nhost: 10.0.0.5\nport: 6300\n").unwrap();
        assert_eq!(cfg.classes_locations, vec![PathBuf::from("/app/classes/")]);
        assert_eq!(cfg.include_patterns.len(), 3);
        assert!(cfg.exclude_patterns.is_empty());
        assert!(cfg.enable_classes_cache);
        assert!(!cfg.local);
        assert_eq!(cfg.address().as_deref(), Some("10.0.0.5:6300"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_remote_requires_address() {
        let mut cfg = ProviderConfig::remote("shop", "localhost", 6300);
        cfg.port = None;
        assert!(cfg.validate().unwrap_err().is_configuration());

        let local = ProviderConfig::local("self");
        assert!(local.validate().is_ok());
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let dup = vec![
            ProviderConfig::remote("a", "h", 1),
            ProviderConfig::remote("a", "h", 2),
        ];
        assert!(validate_providers(&dup).is_err());
        assert!(validate_providers(&[ProviderConfig::remote(" ", "h", 1)]).is_err());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut cfg = ProviderConfig::remote("a", "h", 1);
        cfg.exclude_patterns = vec!["regex:(".into()];
        assert!(cfg.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_build_sources_picks_variant() {
        let sources = build_sources(
            &[ProviderConfig::remote("r", "localhost", 6300), ProviderConfig::local("l")],
            Arc::new(ArtifactResolver::default()),
            Arc::new(StructureMapAnalyzer),
        )
        .unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["r", "l"]);
    }

    #[test]
    fn test_local_without_runtime_is_invalid_state() {
        let provider = LocalProvider::new(
            &ProviderConfig::local("l"),
            Arc::new(ArtifactResolver::default()),
            Arc::new(StructureMapAnalyzer),
        )
        .unwrap()
        .with_object_name("test:type=Missing");
        assert!(matches!(provider.fetch(), Err(CoverageError::InvalidState(_))));
    }
}
