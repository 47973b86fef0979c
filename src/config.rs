//! Configuration management for jacoco-coverage-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel, ResetPolicyArg};
use jacoco_coverage_exporter::projector::validate_labels;
use jacoco_coverage_exporter::provider::validate_providers;
use jacoco_coverage_exporter::{ProviderConfig, ResetPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;

/// Prometheus exposition settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Constant labels attached to every coverage series.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    // Analysis
    /// Threads used to analyze artifacts in parallel
    pub parallelism: Option<usize>,
    /// Maximum age of a cached artifact list; 0 or unset keeps it until restart
    #[serde(alias = "artifact-cache-ttl-seconds")]
    pub artifact_cache_ttl_seconds: Option<u64>,
    #[serde(alias = "reset-policy")]
    pub reset_policy: Option<ResetPolicy>,

    // Feature flags
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,

    /// Monitored applications
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            log_level: Some("info".into()),
            parallelism: None,
            artifact_cache_ttl_seconds: None,
            reset_policy: Some(ResetPolicy::FailFast),
            enable_health: Some(true),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
            prometheus: PrometheusConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl Config {
    pub fn artifact_cache_ttl(&self) -> Option<Duration> {
        match self.artifact_cache_ttl_seconds {
            Some(0) | None => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        }
    }

    pub fn reset_policy(&self) -> ResetPolicy {
        self.reset_policy.unwrap_or_default()
    }

    /// Effective log level; unknown names fall back to info.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(LogLevel::from_name)
            .unwrap_or(LogLevel::Info)
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    validate_providers(&cfg.providers)?;
    validate_labels(&cfg.prometheus.labels)?;

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_name(level).is_none() {
            return Err(format!(
                "Invalid log_level '{level}' (expected off, error, warn, info, debug or trace)"
            )
            .into());
        }
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_pem_file(cert, "certificate")?;
                check_pem_file(key, "private key")?;
            }
        }
    }

    Ok(())
}

fn check_pem_file(path: &str, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(format!("TLS {what} file is empty: {path}").into()),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("TLS {what} file not found: {path}").into())
        }
        Err(e) => Err(format!("TLS {what} file is not readable: {path} ({e})").into()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    // Only override port if the user supplied it on the CLI.
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(level) = &args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    if let Some(ttl) = args.artifact_cache_ttl {
        config.artifact_cache_ttl_seconds = Some(ttl);
    }
    if let Some(policy) = args.reset_policy {
        config.reset_policy = Some(match policy {
            ResetPolicyArg::FailFast => ResetPolicy::FailFast,
            ResetPolicyArg::BestEffort => ResetPolicy::BestEffort,
        });
    }
    if let Some(threads) = args.parallelism {
        config.parallelism = Some(threads);
    }

    if args.disable_health {
        config.enable_health = Some(false);
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Loads configuration from `path`, or from the first default location
/// that exists. Without any file the defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => {
            let defaults = [
                "/etc/jacoco-coverage-exporter/config.yaml",
                "/etc/jacoco-coverage-exporter/config.yml",
                "/etc/jacoco-coverage-exporter/config.json",
                "./jacoco-coverage-exporter.yaml",
                "./jacoco-coverage-exporter.yml",
                "./jacoco-coverage-exporter.json",
                "./jacoco-coverage-exporter.toml",
            ];
            match defaults.iter().map(PathBuf::from).find(|p| p.exists()) {
                Some(p) => p,
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(
    config: &Config,
    format: ConfigFormat,
    user_config: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = render_config(config, &format)?;

    if user_config {
        println!("User configuration (effective values):");
    }
    println!("{output}");
    Ok(())
}

pub fn render_config(
    config: &Config,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_with_providers() {
        let yaml = r#"
port: 9300
artifact_cache_ttl_seconds: 60
reset_policy: best_effort
prometheus:
  labels:
    env: staging
providers:
  - name: shop
    host: shop.internal
    port: 6300
  - name: self
    local: true
    classes_locations: ["/srv/classes"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.port, Some(9300));
        assert_eq!(cfg.artifact_cache_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(cfg.reset_policy(), ResetPolicy::BestEffort);
        assert_eq!(cfg.prometheus.labels.get("env").map(String::as_str), Some("staging"));
        assert_eq!(cfg.providers.len(), 2);
        assert!(cfg.providers[1].local);
        assert!(validate_effective_config(&cfg).is_ok());
    }

    #[test]
    fn test_log_level_from_file() {
        let cfg: Config = serde_yaml::from_str("log_level: DEBUG\n").unwrap();
        assert!(matches!(cfg.log_level(), LogLevel::Debug));
        assert!(validate_effective_config(&cfg).is_ok());

        let cfg = Config {
            log_level: None,
            ..Config::default()
        };
        assert!(matches!(cfg.log_level(), LogLevel::Info));

        let cfg = Config {
            log_level: Some("verbose".into()),
            ..Config::default()
        };
        let err = validate_effective_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("Invalid log_level 'verbose'"));
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let cfg = Config {
            artifact_cache_ttl_seconds: Some(0),
            ..Config::default()
        };
        assert_eq!(cfg.artifact_cache_ttl(), None);
    }

    #[test]
    fn test_reserved_label_rejected() {
        let mut cfg = Config::default();
        cfg.prometheus
            .labels
            .insert("application".into(), "x".into());
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_default_config_round_trips_all_formats() {
        let cfg = Config::default();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            assert!(!render_config(&cfg, &format).unwrap().is_empty());
        }
    }
}
