//! Configuration display endpoint handler.
//!
//! This module provides the `/config` endpoint handler that displays
//! the current exporter configuration.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use jacoco_coverage_exporter::ProviderConfig;
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::config::{Config, DEFAULT_BIND_ADDR, DEFAULT_PORT};
use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

fn join_or_none<T: AsRef<str>>(items: &[T]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn render_provider(out: &mut String, provider: &ProviderConfig) {
    writeln!(out, "[{}]", provider.name).ok();
    let mode = match provider.address() {
        Some(address) if !provider.local => format!("remote {address}"),
        _ => "local".to_string(),
    };
    writeln!(out, "  mode:                     {mode}").ok();
    let locations: Vec<String> = provider
        .classes_locations
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    writeln!(out, "  classes_locations:        {}", join_or_none(&locations)).ok();
    writeln!(
        out,
        "  include_patterns:         {}",
        join_or_none(&provider.include_patterns)
    )
    .ok();
    writeln!(
        out,
        "  exclude_patterns:         {}",
        join_or_none(&provider.exclude_patterns)
    )
    .ok();
    writeln!(
        out,
        "  enable_classes_cache:     {}",
        provider.enable_classes_cache
    )
    .ok();
    writeln!(
        out,
        "  timeout:                  {}",
        provider
            .timeout_seconds
            .map(|s| format!("{s} seconds"))
            .unwrap_or_else(|| "none".to_string())
    )
    .ok();
}

pub(crate) fn render_config_table(cfg: &Config) -> String {
    let mut out = String::new();

    writeln!(out, "JACOCO COVERAGE EXPORTER - CONFIGURATION").ok();
    writeln!(out, "========================================").ok();
    writeln!(out).ok();

    writeln!(out, "SERVER CONFIGURATION").ok();
    writeln!(out, "--------------------").ok();
    writeln!(
        out,
        "bind:                       {}",
        cfg.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    )
    .ok();
    writeln!(
        out,
        "port:                       {}",
        cfg.port.unwrap_or(DEFAULT_PORT)
    )
    .ok();
    writeln!(
        out,
        "enable_health:              {}",
        cfg.enable_health.unwrap_or(true)
    )
    .ok();
    writeln!(out).ok();

    writeln!(out, "TLS/SSL CONFIGURATION").ok();
    writeln!(out, "---------------------").ok();
    writeln!(
        out,
        "enable_tls:                 {}",
        cfg.enable_tls.unwrap_or(false)
    )
    .ok();
    writeln!(
        out,
        "tls_cert_path:              {}",
        cfg.tls_cert_path.as_deref().unwrap_or("none")
    )
    .ok();
    writeln!(
        out,
        "tls_key_path:               {}",
        cfg.tls_key_path.as_deref().unwrap_or("none")
    )
    .ok();
    writeln!(out).ok();

    writeln!(out, "ANALYSIS").ok();
    writeln!(out, "--------").ok();
    writeln!(
        out,
        "parallelism:                {}",
        cfg.parallelism
            .map(|v| v.to_string())
            .unwrap_or_else(|| "auto".to_string())
    )
    .ok();
    writeln!(
        out,
        "artifact_cache_ttl:         {}",
        cfg.artifact_cache_ttl()
            .map(|ttl| format!("{} seconds", ttl.as_secs()))
            .unwrap_or_else(|| "until restart".to_string())
    )
    .ok();
    writeln!(out, "reset_policy:               {:?}", cfg.reset_policy()).ok();
    let labels: Vec<String> = cfg
        .prometheus
        .labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    writeln!(out, "prometheus.labels:          {}", join_or_none(&labels)).ok();
    writeln!(out).ok();

    writeln!(out, "PROVIDERS ({})", cfg.providers.len()).ok();
    writeln!(out, "-------------").ok();
    if cfg.providers.is_empty() {
        writeln!(out, "none").ok();
    }
    for provider in &cfg.providers {
        render_provider(&mut out, provider);
    }

    out
}

/// Handler for the /config endpoint.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /config request");
    state.health_stats.record_http_request();

    let mut table = render_config_table(&state.config);

    writeln!(table).ok();
    writeln!(table, "ARTIFACT CACHE").ok();
    writeln!(table, "--------------").ok();
    for provider in &state.config.providers {
        let cached = state
            .resolver
            .cached_len(&provider.name)
            .map(|n| format!("{n} artifacts"))
            .unwrap_or_else(|| "not resolved".to_string());
        writeln!(table, "{:<27} {}", format!("{}:", provider.name), cached).ok();
    }

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{table}\n{FOOTER_TEXT}"),
    )
}
