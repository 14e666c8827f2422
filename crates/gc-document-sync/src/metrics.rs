//! # Sync Metrics
//!
//! Recording helpers over the collectors in `gc-telemetry`.
//!
//! ## Usage
//!
//! Enabled by the default `metrics` feature. Without it every function here
//! compiles to a no-op.
//!
//! ## Metrics Updated
//!
//! - `gc_scan_runs_total{outcome}` - scans, clean or degraded
//! - `gc_scan_tokens_probed_total` - `getDocument` probes
//! - `gc_scan_duration_seconds` - scan latency
//! - `gc_scan_documents_visible` - documents in the last snapshot
//! - `gc_gateway_actions_total{action,outcome}` - contract actions
//! - `gc_events_received_total{event}` - decoded contract events

#[cfg(feature = "metrics")]
use gc_telemetry::{
    ACTIONS_TOTAL, CONTRACT_EVENTS_RECEIVED, DOCUMENTS_VISIBLE, SCANS_TOTAL, SCAN_DURATION,
    TOKENS_PROBED,
};

use crate::domain::ScanReport;

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a finished scan.
#[cfg(feature = "metrics")]
pub fn record_scan(report: &ScanReport, elapsed_secs: f64) {
    let outcome = if report.is_clean() { "clean" } else { "degraded" };
    SCANS_TOTAL.with_label_values(&[outcome]).inc();
    TOKENS_PROBED.inc_by(report.probe_count() as u64);
    SCAN_DURATION.observe(elapsed_secs);
}

/// Update the visible documents gauge.
#[cfg(feature = "metrics")]
pub fn set_documents_visible(count: usize) {
    DOCUMENTS_VISIBLE.set(count as f64);
}

/// Record a gateway action outcome (`confirmed`, `rejected` or `failed`).
#[cfg(feature = "metrics")]
pub fn record_action(action: &str, outcome: &str) {
    ACTIONS_TOTAL.with_label_values(&[action, outcome]).inc();
}

/// Record a contract event delivered to the sync loop.
#[cfg(feature = "metrics")]
pub fn record_contract_event(event: &str) {
    CONTRACT_EVENTS_RECEIVED.with_label_values(&[event]).inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_scan(_report: &ScanReport, _elapsed_secs: f64) {}

#[cfg(not(feature = "metrics"))]
pub fn set_documents_visible(_count: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn record_action(_action: &str, _outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_contract_event(_event: &str) {}
