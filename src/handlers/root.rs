//! Root endpoint handler for the landing page.
//!
//! This module provides the `/` endpoint handler that displays
//! a landing page with all available endpoints and descriptions.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

fn provider_items(state: &SharedState) -> String {
    let mut out = String::new();
    for provider in &state.config.providers {
        let target = match provider.address() {
            Some(address) if !provider.local => address,
            _ => "local runtime".to_string(),
        };
        writeln!(
            out,
            "        <li><code>{}</code> <span class=\"endpoint-desc\">{}</span></li>",
            provider.name, target
        )
        .ok();
    }
    if out.is_empty() {
        out.push_str("        <li>No providers configured</li>\n");
    }
    out
}

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");
    let build = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown");
    let commit = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown");

    // Calculate actual uptime from service start time
    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    let uptime_str = format!("{}h {}m {}s", hours, minutes, seconds);

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>JaCoCo Coverage Exporter</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            margin: 0;
            padding: 20px;
            background: #f5f5f5;
            line-height: 1.6;
        }}
        .container {{
            max-width: 900px;
            margin: 0 auto;
            background: white;
            padding: 40px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
        }}
        h1 {{
            color: #333;
            border-bottom: 3px solid #007bff;
            padding-bottom: 15px;
        }}
        .info {{
            background: #e9ecef;
            padding: 15px;
            border-radius: 4px;
            display: flex;
            justify-content: space-around;
            flex-wrap: wrap;
        }}
        .info-label {{ font-weight: 600; color: #555; display: block; font-size: 0.9em; }}
        .info-value {{ font-size: 1.1em; color: #007bff; }}
        .endpoint-list li {{ margin: 12px 0; }}
        .endpoint-list a {{ color: #007bff; text-decoration: none; font-weight: 600; }}
        .endpoint-desc {{ color: #666; }}
        .footer {{
            margin-top: 40px;
            padding-top: 20px;
            border-top: 1px solid #ddd;
            color: #666;
            font-size: 0.9em;
            text-align: center;
        }}
        code {{ background: #e9ecef; padding: 2px 6px; border-radius: 3px; }}
    </style>
</head>
<body>
<div class="container">
    <h1>JaCoCo Coverage Exporter</h1>

    <div class="info">
        <div><span class="info-label">Version</span><span class="info-value">{version}</span></div>
        <div><span class="info-label">Build</span><span class="info-value">{build}</span></div>
        <div><span class="info-label">Commit</span><span class="info-value">{commit}</span></div>
        <div><span class="info-label">Uptime</span><span class="info-value">{uptime}</span></div>
    </div>

    <h2>Providers</h2>
    <ul>
{providers}    </ul>

    <h2>Available Endpoints</h2>
    <ul class="endpoint-list">
        <li><a href="/metrics">/metrics</a> <span class="endpoint-desc">Coverage gauges per application (Prometheus)</span></li>
        <li><a href="/v1/coverage">/v1/coverage</a> <span class="endpoint-desc">Instruction coverage report (HTML)</span></li>
        <li><code>POST /v1/reset</code> <span class="endpoint-desc">Reset execution data, optionally for selected applications</span></li>
        <li><a href="/health">/health</a> <span class="endpoint-desc">Exporter internal statistics (text)</span></li>
        <li><a href="/config">/config</a> <span class="endpoint-desc">Active runtime configuration (read-only)</span></li>
    </ul>

    <div class="footer">
        <p>{footer}</p>
    </div>
</div>
</body>
</html>"#,
        version = version,
        build = build,
        commit = commit,
        uptime = uptime_str,
        providers = provider_items(&state),
        footer = FOOTER_TEXT
    );

    Html(html)
}
