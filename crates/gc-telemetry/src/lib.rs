//! # GovChain Telemetry
//!
//! Logging and metrics for the registry client.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` registry with an `EnvFilter` and either a
//!   human-readable or a JSON formatting layer
//! - **Metrics**: Prometheus counters, gauges and histograms in one registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gc_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // Spans, events and metrics are now being collected
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GC_SERVICE_NAME` | `govchain-client` | Service name in logs |
//! | `GC_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `GC_JSON_LOGS` | `false` | Emit JSON lines instead of text |
//! | `GC_CONSOLE_OUTPUT` | `true` | Write logs to stderr at all |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, ACTIONS_TOTAL,
    CONTRACT_EVENTS_RECEIVED, DOCUMENTS_VISIBLE, SCANS_TOTAL, SCAN_DURATION, TOKENS_PROBED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The subscriber could not be installed (usually: one already is).
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    /// A collector could not be registered.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// The log filter did not parse.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = register_metrics()?;
    tracing_setup::init_tracing(&config)?;

    Ok(TelemetryGuard {
        service_name: config.service_name,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "govchain-client");
    }

    #[test]
    fn test_counters_exported() {
        TOKENS_PROBED.inc_by(3);
        assert!(TOKENS_PROBED.get() >= 3);
    }
}
