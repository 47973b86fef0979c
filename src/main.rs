//! jacoco-coverage-exporter - version 0.1.0
//!
//! Prometheus exporter for JaCoCo coverage with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod health_stats;
mod state;

use axum::{
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use jacoco_coverage_exporter::{
    build_sources, ArtifactResolver, CoverageMetrics, ResetOrchestrator, StructureMapAnalyzer,
};
use prometheus::{Gauge, Registry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal};
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};

use cli::{Args, Commands, LogLevel};
use commands::{
    command_check, command_config, command_generate_testdata, command_reset, command_test,
};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{
    config_handler, coverage_handler, health_handler, metrics_handler, reset_handler, root_handler,
};
use health_stats::HealthStats;
use state::{AppState, SharedState};

/// Initializes tracing logging subsystem with the configured log level.
fn setup_logging(config: &Config) {
    let level = config.log_level();
    let log_level = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return;
    }

    info!("Logging initialized with level: {}", level.as_str());
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Builds the shared state: registry, coverage projection and providers.
fn build_state(config: Config) -> Result<SharedState, Box<dyn std::error::Error>> {
    let registry = Registry::new();
    debug!("Prometheus registry initialized");

    let coverage_metrics = CoverageMetrics::new(&config.prometheus.labels)?;
    let scrape_duration = Gauge::new(
        "jacoco_exporter_scrape_duration_seconds",
        "Time spent serving the last /metrics request",
    )?;
    registry.register(Box::new(coverage_metrics.scrape_duration().clone()))?;
    registry.register(Box::new(scrape_duration.clone()))?;
    debug!("All metrics registered successfully");

    let resolver = Arc::new(ArtifactResolver::new(config.artifact_cache_ttl()));
    let sources = build_sources(
        &config.providers,
        resolver.clone(),
        Arc::new(StructureMapAnalyzer),
    )?;

    if sources.is_empty() {
        warn!("No providers configured - /metrics will only export exporter metrics");
    }
    for source in &sources {
        info!("Provider [{}] configured", source.name());
    }

    Ok(Arc::new(AppState {
        registry,
        coverage_metrics,
        scrape_duration,
        sources,
        resolver,
        orchestrator: ResetOrchestrator::new(config.reset_policy()),
        health_stats: Arc::new(HealthStats::new()),
        config: Arc::new(config),
        start_time: Instant::now(),
    }))
}

fn build_router(state: SharedState) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/coverage", get(coverage_handler))
        .route("/v1/reset", post(reset_handler));

    if state.config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    app.route("/config", get(config_handler)).with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.show_user_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        if args.show_config {
            return show_config(&config, args.config_format, false);
        }

        if args.show_user_config {
            return show_config(&config, args.config_format, true);
        }
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        // These don't read the configuration
        match command {
            Commands::Config {
                output,
                format,
                commented,
            } => return command_config(output.clone(), format.clone(), *commented),
            Commands::GenerateTestdata {
                output,
                packages,
                classes_per_package,
                hit_ratio,
            } => {
                return command_generate_testdata(
                    output.clone(),
                    *packages,
                    *classes_per_package,
                    *hit_ratio,
                )
            }
            _ => {}
        }

        // `check` reports validation problems itself
        if let Commands::Check { connect, verbose } = command {
            let config = resolve_config(&args)?;
            setup_logging(&config);
            return command_check(*connect, *verbose, &config);
        }

        let config = load_validated_config(&args)?;
        setup_logging(&config);

        return match command {
            Commands::Test { exec_file, verbose } => {
                command_test(exec_file.clone(), *verbose, &config)
            }
            Commands::Reset { applications } => command_reset(applications.clone(), &config),
            Commands::Check { .. } | Commands::Config { .. } | Commands::GenerateTestdata { .. } => {
                Ok(())
            }
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    setup_logging(&config);

    info!(
        "Starting jacoco-coverage-exporter {}",
        env!("CARGO_PKG_VERSION")
    );

    let bind_ip_str = config
        .bind
        .clone()
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let port = config.port.unwrap_or(DEFAULT_PORT);

    // Configure parallel analysis
    if let Some(threads) = config.parallelism {
        if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .unwrap_or_else(|e| error!("Failed to set rayon thread pool: {}", e));
            debug!("Rayon thread pool configured with {} threads", threads);
        }
    }

    let enable_tls = config.enable_tls.unwrap_or(false);
    let tls_paths = (config.tls_cert_path.clone(), config.tls_key_path.clone());

    let state = build_state(config)?;
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    if enable_tls {
        // Both paths were checked by validate_effective_config()
        let (Some(cert_path), Some(key_path)) = tls_paths else {
            return Err("TLS is enabled but certificate or key path is missing".into());
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!(
            "jacoco-coverage-exporter listening on https://{}:{}",
            bind_ip_str, port
        );

        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "jacoco-coverage-exporter listening on http://{}:{}",
            bind_ip_str, port
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                error!("Server error: {}", e);
                e
            })?;
    }

    info!("jacoco-coverage-exporter stopped gracefully");
    Ok(())
}
