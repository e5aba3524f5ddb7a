//! Prometheus metrics for the Continuum core.
//!
//! All metrics follow the naming convention: `continuum_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., rpc_invocations_total)
//! - **Gauge**: Value that can go up or down (e.g., registry_active_services)
//! - **Histogram**: Distribution of values (e.g., rpc_invocation_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Histogram, HistogramOpts, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Registry all Continuum collectors are exported from
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // REGISTRY METRICS
    // =========================================================================

    /// Services with an active handler on this node
    pub static ref REGISTRY_ACTIVE_SERVICES: IntGauge = IntGauge::new(
        "continuum_registry_active_services",
        "Number of services with an active handler"
    ).expect("metric creation failed");

    /// Register/unregister attempts
    pub static ref REGISTRY_OPERATIONS: CounterVec = CounterVec::new(
        Opts::new("continuum_registry_operations_total", "Registry operations"),
        &["operation", "outcome"]  // operation: register/unregister, outcome: ok/already_registered/not_registered
    ).expect("metric creation failed");

    // =========================================================================
    // RPC METRICS
    // =========================================================================

    /// Proxy invocations by outcome
    pub static ref RPC_INVOCATIONS: CounterVec = CounterVec::new(
        Opts::new("continuum_rpc_invocations_total", "RPC invocations issued by proxies"),
        &["outcome"]  // outcome: ok/remote_error/unknown_method/timeout/error
    ).expect("metric creation failed");

    /// Proxy round-trip time
    pub static ref RPC_INVOCATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "continuum_rpc_invocation_duration_seconds",
            "Time from request send to first reply"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // ENDPOINT METRICS
    // =========================================================================

    /// Endpoint sends by scheme and outcome
    pub static ref ENDPOINT_SENDS: CounterVec = CounterVec::new(
        Opts::new("continuum_endpoint_sends_total", "Events sent through connection endpoints"),
        &["scheme", "outcome"]
    ).expect("metric creation failed");

    /// Live endpoint subscriptions
    pub static ref ENDPOINT_SUBSCRIPTIONS_ACTIVE: IntGauge = IntGauge::new(
        "continuum_endpoint_subscriptions_active",
        "Subscriptions currently held by connection endpoints"
    ).expect("metric creation failed");

    /// Authorization rejections (for alerting)
    pub static ref AUTHORIZATION_DENIALS: CounterVec = CounterVec::new(
        Opts::new("continuum_authorization_denials_total", "Rejected sends, subscribes and reply-to headers"),
        &["action"]  // action: send/subscribe/reply_to
    ).expect("metric creation failed");

    /// Sessions created by login
    pub static ref SESSIONS_CREATED: IntCounter = IntCounter::new(
        "continuum_sessions_created_total",
        "Sessions created from identity and secret"
    ).expect("metric creation failed");
}

/// Register all metrics with [`REGISTRY`].
///
/// Safe to call more than once; collectors already registered are skipped.
///
/// # Errors
///
/// Returns [`TelemetryError::MetricsInit`] for any other registration failure.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Registry
        Box::new(REGISTRY_ACTIVE_SERVICES.clone()),
        Box::new(REGISTRY_OPERATIONS.clone()),
        // RPC
        Box::new(RPC_INVOCATIONS.clone()),
        Box::new(RPC_INVOCATION_DURATION.clone()),
        // Endpoint
        Box::new(ENDPOINT_SENDS.clone()),
        Box::new(ENDPOINT_SUBSCRIPTIONS_ACTIVE.clone()),
        Box::new(AUTHORIZATION_DENIALS.clone()),
        Box::new(SESSIONS_CREATED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
///
/// # Errors
///
/// Returns [`TelemetryError::MetricsInit`] if encoding fails.
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
    #[must_use]
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

/// Gauge that counts live guards.
pub struct GaugeGuard {
    gauge: IntGauge,
}

impl GaugeGuard {
    /// Increment now, decrement on drop.
    #[must_use]
    pub fn new(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self {
            gauge: gauge.clone(),
        }
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Convenience wrapper for labelled counters.
pub fn record(counter: &CounterVec, labels: &[&str]) {
    counter.with_label_values(labels).inc();
}
