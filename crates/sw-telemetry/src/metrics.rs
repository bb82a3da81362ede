//! Prometheus metrics for the evaluation engine.
//!
//! All metrics follow the naming convention: `sw_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g. interactions_total)
//! - **Histogram**: Distribution of values (e.g. interaction_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVALUATOR METRICS
    // =========================================================================

    /// Interactions folded, by outcome (ok/error/exception/skipped)
    pub static ref INTERACTIONS_EVALUATED: CounterVec = CounterVec::new(
        Opts::new("sw_evaluator_interactions_total", "Interactions processed by the fold loop"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Handler execution time per interaction
    pub static ref INTERACTION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "sw_evaluator_interaction_duration_seconds",
            "Time spent evaluating a single interaction"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");

    /// Internal writes resolved, by outcome (ok/error/exception)
    pub static ref INTERNAL_WRITES: CounterVec = CounterVec::new(
        Opts::new("sw_evaluator_internal_writes_total", "Internal writes resolved"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Root evaluations, by outcome (ok/error/cancelled)
    pub static ref EVALUATIONS: CounterVec = CounterVec::new(
        Opts::new("sw_evaluations_total", "Top-level contract evaluations"),
        &["outcome"]
    ).expect("metric creation failed");

    // =========================================================================
    // CACHE METRICS
    // =========================================================================

    /// Cache lookups by kind (exact/less_or_equal/less_than/last) and result (hit/miss)
    pub static ref CACHE_LOOKUPS: CounterVec = CounterVec::new(
        Opts::new("sw_cache_lookups_total", "Sort key cache lookups"),
        &["kind", "result"]
    ).expect("metric creation failed");

    /// Puts that found a different value at the same key
    pub static ref CACHE_CONFLICTS: Counter = Counter::new(
        "sw_cache_conflicts_total",
        "Conflicting writes at an existing cache key"
    ).expect("metric creation failed");
}

/// Handle returned once the metrics are registered.
#[derive(Debug)]
pub struct MetricsHandle {
    registered: usize,
}

impl MetricsHandle {
    /// Number of collectors in the registry.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.registered
    }
}

/// Register all metrics with the global registry.
///
/// Registering twice is not an error.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Evaluator
        Box::new(INTERACTIONS_EVALUATED.clone()),
        Box::new(INTERACTION_DURATION.clone()),
        Box::new(INTERNAL_WRITES.clone()),
        Box::new(EVALUATIONS.clone()),
        // Cache
        Box::new(CACHE_LOOKUPS.clone()),
        Box::new(CACHE_CONFLICTS.clone()),
    ];
    let registered = metrics.len();

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { registered })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }

    /// Seconds elapsed so far.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.elapsed_secs());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
