//! Config command implementation.
//!
//! Generates configuration files in various formats.

use jacoco_coverage_exporter::ProviderConfig;
use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Configuration with one example provider, so the generated file shows
/// every provider field.
fn sample_config() -> Config {
    let mut provider = ProviderConfig::remote("my-application", "localhost", 6300);
    provider.timeout_seconds = Some(10);
    Config {
        providers: vec![provider],
        ..Config::default()
    }
}

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = sample_config();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("jacoco-coverage-exporter.yaml"),
    };

    let mut content = render_config(&config, &format)?;
    if commented {
        content = match format {
            ConfigFormat::Yaml | ConfigFormat::Toml => add_config_comments(content),
            // JSON has no comments
            ConfigFormat::Json => content,
        };
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML/TOML configuration; both use `#`.
fn add_config_comments(body: String) -> String {
    let comments = r#"# JaCoCo Coverage Exporter Configuration
# =======================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"                  # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                       # HTTP port
# log_level: "info"                # off, error, warn, info, debug, trace
# enable_health: true              # Enable /health endpoint
#
# Analysis
# --------
# parallelism: null                # Analysis threads (null = auto)
# artifact_cache_ttl_seconds: null # Re-resolve artifact lists after N seconds (null/0 = never)
# reset_policy: fail_fast          # fail_fast or best_effort
#
# Prometheus
# ----------
# prometheus:
#   labels:                        # Constant labels on every coverage series
#     env: production              # ("application" is reserved)
#
# Providers
# ---------
# providers:
#   - name: my-application         # Value of the "application" label
#     host: localhost              # Agent tcpserver host
#     port: 6300                   # Agent tcpserver port
#     local: false                 # Use a runtime registered in this process
#     classes_locations: ["/app/classes/"]
#     include_patterns: ["glob:**.class", "glob:**.jar", "glob:**.classmap.json"]
#     exclude_patterns: []         # glob:/regex: patterns, win over includes
#     enable_classes_cache: true   # Keep resolved artifact lists between requests
#     timeout_seconds: 10          # Connect/read timeout
#
# TLS/SSL Configuration
# ---------------------
# enable_tls: false                # Enable HTTPS (default: false)
# tls_cert_path: null              # Path to TLS certificate (PEM format)
# tls_key_path: null               # Path to TLS private key (PEM format)
"#;

    format!("{comments}\n{body}")
}
