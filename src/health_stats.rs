//! Health statistics and monitoring for the exporter.
//!
//! This module tracks scrape, report and reset activity so the `/health`
//! endpoint can render it as a plain-text table.

use jacoco_coverage_exporter::scope::ScopeStats;
use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = RunningStat {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (last, avg, max, min, count)
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Sliding window of HTTP request timestamps.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(256)),
        }
    }
}

impl RequestTimestamps {
    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            let now = Instant::now();
            guard.push_back(now);
            // Keep only the last 10 minutes
            let cutoff = now.checked_sub(Duration::from_secs(600)).unwrap_or(now);
            while guard.front().is_some_and(|&t| t < cutoff) {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        if let Ok(guard) = self.inner.lock() {
            let now = Instant::now();
            let cutoff = now.checked_sub(Duration::from_secs(60)).unwrap_or(now);
            guard.iter().filter(|&&t| t >= cutoff).count() as u64
        } else {
            0
        }
    }
}

/// Exporter activity counters.
pub struct HealthStats {
    pub scrape_duration_seconds: Stat,
    pub providers_up: Stat,
    pub scrapes_total: AtomicU64,
    pub provider_failures: AtomicU64,

    pub reports_total: AtomicU64,
    pub report_failures: AtomicU64,
    pub resets_total: AtomicU64,
    pub reset_failures: AtomicU64,

    pub scope_hits: AtomicU64,
    pub scope_misses: AtomicU64,

    pub http_request_timestamps: RequestTimestamps,
    start_time: Instant,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Self {
            scrape_duration_seconds: Stat::default(),
            providers_up: Stat::default(),
            scrapes_total: AtomicU64::new(0),
            provider_failures: AtomicU64::new(0),
            reports_total: AtomicU64::new(0),
            report_failures: AtomicU64::new(0),
            resets_total: AtomicU64::new(0),
            reset_failures: AtomicU64::new(0),
            scope_hits: AtomicU64::new(0),
            scope_misses: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            start_time: Instant::now(),
        }
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    /// One finished scrape: its duration and how many providers answered.
    pub fn record_scrape(&self, duration_seconds: f64, up: usize, total: usize) {
        self.scrapes_total.fetch_add(1, Ordering::Relaxed);
        self.scrape_duration_seconds.add_sample(duration_seconds);
        self.providers_up.add_sample(up as f64);
        self.provider_failures
            .fetch_add(total.saturating_sub(up) as u64, Ordering::Relaxed);
    }

    pub fn record_report(&self, success: bool) {
        self.reports_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.report_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_reset(&self, success: bool) {
        self.resets_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.reset_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_scope(&self, stats: ScopeStats) {
        self.scope_hits.fetch_add(stats.hits, Ordering::Relaxed);
        self.scope_misses.fetch_add(stats.misses, Ordering::Relaxed);
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let (sd_cur, sd_avg, sd_max, sd_min, _) = self.scrape_duration_seconds.snapshot();
        let (pu_cur, pu_avg, pu_max, pu_min, _) = self.providers_up.snapshot();

        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "SCRAPES").ok();
        writeln!(out, "-------").ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "scrape_duration (s)",
            format!("{:.3}", sd_cur),
            format!("{:.3}", sd_avg),
            format!("{:.3}", sd_max),
            format!("{:.3}", sd_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "providers_up",
            format!("{:.0}", pu_cur),
            format!("{:.1}", pu_avg),
            format!("{:.0}", pu_max),
            format!("{:.0}", pu_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "COUNTERS").ok();
        writeln!(out, "--------").ok();
        let counters = [
            ("scrapes_total", &self.scrapes_total),
            ("provider_failures", &self.provider_failures),
            ("reports_total", &self.reports_total),
            ("report_failures", &self.report_failures),
            ("resets_total", &self.resets_total),
            ("reset_failures", &self.reset_failures),
            ("scope_hits", &self.scope_hits),
            ("scope_misses", &self.scope_misses),
        ];
        for (name, value) in counters {
            writeln!(
                out,
                "{:left$} | {:>col$}",
                name,
                value.load(Ordering::Relaxed),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(
            out,
            "http requests (last minute): {} | uptime: {:.1}h",
            self.http_request_timestamps.count_last_minute(),
            self.get_uptime_seconds() as f64 / 3600.0
        )
        .ok();

        out
    }
}
