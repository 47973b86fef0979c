//! CLI arguments and subcommands for jacoco-coverage-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parses the `log_level` value of a config file.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "off" => Some(LogLevel::Off),
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Reset policy as accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ResetPolicyArg {
    FailFast,
    BestEffort,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "jacoco-coverage-exporter",
    about = "Prometheus exporter for JaCoCo code coverage of running applications",
    long_about = "Prometheus exporter for JaCoCo code coverage of running applications.\n\n\
                  Dumps execution data from the coverage agents of the configured applications, \
                  analyzes it against their compiled classes and exposes instruction, branch, line, \
                  method, class and complexity counters as Prometheus gauges.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level [default: info, or `log_level` from the config file]
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Print only the loaded user config file + full path and exit
    #[arg(long)]
    pub show_user_config: bool,

    /// Output format for --show-config*
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Maximum age of cached artifact lists in seconds (0 = never expire)
    #[arg(long)]
    pub artifact_cache_ttl: Option<u64>,

    /// What to do when resetting one of several providers fails
    #[arg(long, value_enum)]
    pub reset_policy: Option<ResetPolicyArg>,

    /// Parallel analysis threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration, resolve artifacts and optionally probe agents
    Check {
        /// Connect to every remote agent
        #[arg(long)]
        connect: bool,

        /// Print every resolved artifact
        #[arg(long)]
        verbose: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Collect coverage once and print the counters
    Test {
        /// Analyze this execution-data file instead of contacting the providers
        #[arg(long)]
        exec_file: Option<PathBuf>,

        /// Print per-package counters
        #[arg(long)]
        verbose: bool,
    },

    /// Reset coverage of the configured providers
    Reset {
        /// Only reset these providers (default: all)
        #[arg(short = 'a', long = "application")]
        applications: Vec<String>,
    },

    /// Generate a synthetic class tree and matching execution data
    GenerateTestdata {
        /// Output directory
        #[arg(short = 'o', long, default_value = "testdata")]
        output: PathBuf,

        /// Number of packages to generate
        #[arg(long, default_value_t = 3)]
        packages: usize,

        /// Number of classes per package
        #[arg(long, default_value_t = 4)]
        classes_per_package: usize,

        /// Probability that a probe is hit
        #[arg(long, default_value_t = 0.6)]
        hit_ratio: f64,
    },
}
