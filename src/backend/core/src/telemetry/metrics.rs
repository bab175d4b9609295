//! Prometheus metrics.
//!
//! Counters are recorded through the `metrics` facade wherever they happen;
//! this module installs the exporter and renders it for `GET /metrics`.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Handle used to render the scrape body.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry that renders nothing (tests, or when no recorder is installed).
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the global Prometheus recorder.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics(service_name: &str) -> anyhow::Result<MetricsRegistry> {
    let handle = PrometheusBuilder::new()
        .add_global_label("service", service_name)
        .install_recorder()?;

    register_metric_descriptions();
    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_counter!("rate_limit_checks_total", "Rate limit checks by namespace and outcome");
    describe_counter!("rate_limit_rejected_total", "Requests rejected by a rate limiter");
    describe_counter!("cache_hits_total", "Response cache hits");
    describe_counter!("cache_misses_total", "Response cache misses");
    describe_counter!("cache_evictions_total", "Entries removed by bulk eviction");
    describe_gauge!("cache_entries", "Entries currently held by the response cache");
    describe_counter!("upstream_retries_total", "Retries of upstream generation calls");
    describe_counter!("fallback_served_total", "Canned responses served by feature and cause");
    describe_counter!("roastify_errors_total", "Errors by code");
}
