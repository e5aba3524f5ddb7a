//! # Continuum Telemetry
//!
//! Logging and metrics setup shared by every Continuum process.
//!
//! ## Components
//!
//! - **Logs**: `tracing` records rendered by `tracing-subscriber`, plain for
//!   development and JSON for log shippers.
//! - **Metrics**: Prometheus collectors for the registry, RPC proxies and
//!   connection endpoints.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use continuum_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(&TelemetryConfig::from_env()).expect("telemetry");
//!     // Logs and metrics are now being collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CONTINUUM_SERVICE_NAME` | `continuum` | Service name in log records |
//! | `CONTINUUM_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` wins) |
//! | `CONTINUUM_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `CONTINUUM_JSON_LOGS` | `false` | JSON log records |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};
pub use metrics::{encode_metrics, register_metrics, GaugeGuard, HistogramTimer};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
///
/// # Errors
///
/// Propagates [`init_logging`] and [`register_metrics`] failures.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    init_logging(config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name.clone(),
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
