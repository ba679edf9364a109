//! Prometheus metrics for the transaction layer.
//!
//! All metrics follow the naming convention: `quay_<area>_<metric>_<unit>`

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
    // COORDINATOR METRICS
    // =========================================================================

    /// Transactions declared by the coordinator
    pub static ref TXN_DECLARED: Counter = Counter::new(
        "quay_txn_declared_total",
        "Total number of transactions declared"
    ).expect("metric creation failed");

    /// Discharges by kind and outcome
    pub static ref TXN_DISCHARGED: CounterVec = CounterVec::new(
        Opts::new("quay_txn_discharged_total", "Total transaction discharges"),
        &["kind", "outcome"]  // kind: commit/rollback/close, outcome: accepted/rejected/link_lost/timeout
    ).expect("metric creation failed");

    /// Coordinator link attaches, including re-attaches after link loss
    pub static ref COORDINATOR_ATTACHES: Counter = Counter::new(
        "quay_coordinator_attaches_total",
        "Total coordinator link attaches"
    ).expect("metric creation failed");

    // =========================================================================
    // CONSUMER FLOW METRICS
    // =========================================================================

    /// Prefetched deliveries released back to the peer
    pub static ref DELIVERIES_RELEASED: Counter = Counter::new(
        "quay_consumer_deliveries_released_total",
        "Total prefetched deliveries released on rollback or consumer close"
    ).expect("metric creation failed");

    /// Time spent draining consumer credit before a rollback
    pub static ref DRAIN_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "quay_consumer_drain_duration_seconds",
            "Time spent stopping consumers before rollback"
        ).buckets(exponential_buckets(0.0005, 2.0, 14).expect("bucket creation failed"))
    ).expect("metric creation failed");
}

/// Handle returned once metrics are registered.
pub struct MetricsHandle {
    _registry: Registry,
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already registered collectors are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(TXN_DECLARED.clone()),
        Box::new(TXN_DISCHARGED.clone()),
        Box::new(COORDINATOR_ATTACHES.clone()),
        Box::new(DELIVERIES_RELEASED.clone()),
        Box::new(DRAIN_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: REGISTRY.clone(),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn gather() -> Result<String, TelemetryError> {
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
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
