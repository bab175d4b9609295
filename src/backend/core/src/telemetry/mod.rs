//! Telemetry: structured logging and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use roastify_core::telemetry::{init_telemetry, LoggingConfig};
//!
//! let metrics = init_telemetry(&LoggingConfig::default(), "roastify-server")
//!     .expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{init_metrics, MetricsRegistry};

/// Initialize logging, then metrics.
pub fn init_telemetry(logging: &LoggingConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    init_logging(logging)?;
    init_metrics(service_name)
}
