//! Prometheus metrics for the registry client.
//!
//! All metrics follow the naming convention: `gc_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., gc_scan_runs_total)
//! - **Gauge**: Value that can go up or down (e.g., gc_scan_documents_visible)
//! - **Histogram**: Distribution of values (e.g., gc_scan_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SCANNER METRICS
    // =========================================================================

    /// Completed scans by outcome
    pub static ref SCANS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gc_scan_runs_total", "Document scans completed"),
        &["outcome"]  // outcome: clean/degraded
    ).expect("metric creation failed");

    /// Identifiers probed with getDocument
    pub static ref TOKENS_PROBED: IntCounter = IntCounter::new(
        "gc_scan_tokens_probed_total",
        "Total identifiers probed by the scanner"
    ).expect("metric creation failed");

    /// Scan duration histogram
    pub static ref SCAN_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "gc_scan_duration_seconds",
            "Time spent on one full scan"
        ).buckets(exponential_buckets(0.005, 2.0, 12).unwrap_or_default())
    ).expect("metric creation failed");

    /// Documents visible to the current viewer after the last scan
    pub static ref DOCUMENTS_VISIBLE: Gauge = Gauge::new(
        "gc_scan_documents_visible",
        "Documents visible to the connected viewer"
    ).expect("metric creation failed");

    // =========================================================================
    // GATEWAY METRICS
    // =========================================================================

    /// Mutating actions by kind and outcome
    pub static ref ACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gc_gateway_actions_total", "Contract actions submitted"),
        &["action", "outcome"]  // outcome: confirmed/rejected/failed
    ).expect("metric creation failed");

    // =========================================================================
    // EVENT METRICS
    // =========================================================================

    /// Contract events received from the log subscription
    pub static ref CONTRACT_EVENTS_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("gc_events_received_total", "Contract events received"),
        &["event"]
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; collectors already registered are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Scanner
        Box::new(SCANS_TOTAL.clone()),
        Box::new(TOKENS_PROBED.clone()),
        Box::new(SCAN_DURATION.clone()),
        Box::new(DOCUMENTS_VISIBLE.clone()),
        // Gateway
        Box::new(ACTIONS_TOTAL.clone()),
        // Events
        Box::new(CONTRACT_EVENTS_RECEIVED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
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
