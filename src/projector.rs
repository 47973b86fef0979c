//! Projection of coverage trees onto Prometheus gauges.
//!
//! For every provider there are 18 gauges: six counter categories times
//! covered/missed/total. They are evaluated at scrape time through the
//! request scope, so a scrape computes each provider's tree at most once.
//! A provider whose tree cannot be computed is left out of the scrape and
//! reported through `jacoco_provider_up`.

use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, HistogramOpts, HistogramVec, Opts};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::coverage::{Counter, CounterEntity, CoverageNode};
use crate::error::{CoverageError, Result};
use crate::provider::CoverageSource;
use crate::scope::CoverageScope;

pub const METRIC_PREFIX: &str = "jacoco";
pub const APPLICATION_LABEL: &str = "application";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeKind {
    Covered,
    Missed,
    Total,
}

impl GaugeKind {
    pub const ALL: [GaugeKind; 3] = [GaugeKind::Covered, GaugeKind::Missed, GaugeKind::Total];

    pub fn suffix(self) -> &'static str {
        match self {
            GaugeKind::Covered => "covered",
            GaugeKind::Missed => "missed",
            GaugeKind::Total => "total",
        }
    }

    pub fn read(self, counter: Counter) -> u64 {
        match self {
            GaugeKind::Covered => counter.covered(),
            GaugeKind::Missed => counter.missed(),
            GaugeKind::Total => counter.total(),
        }
    }
}

/// One gauge family: a category and a kind, labelled per provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeSpec {
    pub name: String,
    pub help: String,
    pub entity: CounterEntity,
    pub kind: GaugeKind,
}

impl GaugeSpec {
    fn new(entity: CounterEntity, kind: GaugeKind) -> Self {
        Self {
            name: format!("{METRIC_PREFIX}_{}_{}", entity.metric_name(), kind.suffix()),
            help: format!("Number of currently {} {}", kind.suffix(), entity.metric_name()),
            entity,
            kind,
        }
    }
}

pub fn is_valid_label_name(name: &str) -> bool {
    static LABEL_NAME: once_cell::sync::Lazy<Option<Regex>> =
        once_cell::sync::Lazy::new(|| Regex::new("^[a-zA-Z_][a-zA-Z0-9_]*$").ok());
    LABEL_NAME
        .as_ref()
        .is_some_and(|re| re.is_match(name) && !name.starts_with("__"))
}

/// Checks the constant label set shared by every coverage series.
pub fn validate_labels(labels: &BTreeMap<String, String>) -> Result<()> {
    for name in labels.keys() {
        if name == APPLICATION_LABEL {
            return Err(CoverageError::Configuration(format!(
                "Constant label '{APPLICATION_LABEL}' is reserved for the provider name"
            )));
        }
        if !is_valid_label_name(name) {
            return Err(CoverageError::Configuration(format!(
                "Invalid Prometheus label name '{name}'"
            )));
        }
    }
    Ok(())
}

pub struct CoverageMetrics {
    gauges: Vec<GaugeSpec>,
    labels: HashMap<String, String>,
    scrape_duration: HistogramVec,
}

impl CoverageMetrics {
    pub fn new(labels: &BTreeMap<String, String>) -> Result<Self> {
        validate_labels(labels)?;

        let gauges = CounterEntity::ALL
            .iter()
            .flat_map(|&entity| GaugeKind::ALL.iter().map(move |&kind| GaugeSpec::new(entity, kind)))
            .collect();

        let scrape_duration = HistogramVec::new(
            HistogramOpts::new(
                format!("{METRIC_PREFIX}_scrape_duration_seconds"),
                "Time required to compute the coverage for a single provider",
            ),
            &[APPLICATION_LABEL],
        )
        .map_err(|e| CoverageError::Configuration(e.to_string()))?;

        Ok(Self {
            gauges,
            labels: labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            scrape_duration,
        })
    }

    pub fn gauges(&self) -> &[GaugeSpec] {
        &self.gauges
    }

    /// Per-provider computation time; register it with the exporter registry.
    pub fn scrape_duration(&self) -> &HistogramVec {
        &self.scrape_duration
    }

    fn gauge_vec(&self, name: &str, help: &str) -> Option<GaugeVec> {
        let opts = Opts::new(name, help).const_labels(self.labels.clone());
        match GaugeVec::new(opts, &[APPLICATION_LABEL]) {
            Ok(vec) => Some(vec),
            Err(e) => {
                error!("Cannot create gauge {}: {}", name, e);
                None
            }
        }
    }

    /// Evaluates every gauge of every source within `scope`.
    pub fn collect(&self, scope: &CoverageScope, sources: &[Arc<dyn CoverageSource>]) -> Projection {
        let families: Vec<(GaugeSpec, GaugeVec)> = self
            .gauges
            .iter()
            .filter_map(|spec| self.gauge_vec(&spec.name, &spec.help).map(|v| (spec.clone(), v)))
            .collect();
        let up = self.gauge_vec(
            &format!("{METRIC_PREFIX}_provider_up"),
            "Whether the coverage of the provider could be computed (1) or not (0)",
        );

        let mut providers_up = 0;
        for source in sources {
            let name = source.name();
            let result = scope.get_or_compute(name, || {
                let start = Instant::now();
                let result = source.coverage();
                self.scrape_duration
                    .with_label_values(&[name])
                    .observe(start.elapsed().as_secs_f64());
                result
            });

            let bundle = match result {
                Ok(bundle) => bundle,
                Err(e) => {
                    warn!("Coverage of [{}] unavailable, skipping its series: {}", name, e);
                    if let Some(up) = &up {
                        up.with_label_values(&[name]).set(0.0);
                    }
                    continue;
                }
            };

            for (spec, vec) in &families {
                let value = spec.kind.read(bundle.counter(spec.entity));
                vec.with_label_values(&[name]).set(value as f64);
            }
            if let Some(up) = &up {
                up.with_label_values(&[name]).set(1.0);
            }
            providers_up += 1;
            debug!("Projected {} series for [{}]", families.len(), name);
        }

        let mut out: Vec<MetricFamily> = families
            .iter()
            .flat_map(|(_, vec)| vec.collect())
            .filter(|mf| !mf.get_metric().is_empty())
            .collect();
        if let Some(up) = up {
            out.extend(up.collect().into_iter().filter(|mf| !mf.get_metric().is_empty()));
        }
        Projection {
            families: out,
            providers_up,
        }
    }
}

/// Result of one evaluation of the coverage gauges.
#[derive(Debug)]
pub struct Projection {
    pub families: Vec<MetricFamily>,
    /// Providers whose coverage could be computed.
    pub providers_up: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eighteen_gauge_names() {
        let metrics = CoverageMetrics::new(&BTreeMap::new()).unwrap();
        let names: Vec<&str> = metrics.gauges().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names.len(), 18);
        assert!(names.contains(&"jacoco_instructions_covered"));
        assert!(names.contains(&"jacoco_branches_missed"));
        assert!(names.contains(&"jacoco_complexity_total"));
        assert!(names.contains(&"jacoco_classes_total"));
    }

    #[test]
    fn test_gauge_help_text() {
        let spec = GaugeSpec::new(CounterEntity::Line, GaugeKind::Missed);
        assert_eq!(spec.help, "Number of currently missed lines");
    }

    #[test]
    fn test_label_validation() {
        let mut labels = BTreeMap::new();
        labels.insert("env".to_string(), "prod".to_string());
        assert!(validate_labels(&labels).is_ok());

        labels.insert("application".to_string(), "x".to_string());
        assert!(validate_labels(&labels).is_err());

        let mut bad = BTreeMap::new();
        bad.insert("1abc".to_string(), "x".to_string());
        assert!(CoverageMetrics::new(&bad).is_err());
    }

    #[test]
    fn test_kind_reads_counter() {
        let c = Counter::new(6, 4);
        assert_eq!(GaugeKind::Covered.read(c), 6);
        assert_eq!(GaugeKind::Missed.read(c), 4);
        assert_eq!(GaugeKind::Total.read(c), 10);
    }
}
