//! # Observability
//!
//! Prometheus exporter and dispatch metrics.
//!
//! Tracing itself is initialized by the binary; this crate only installs the
//! metrics recorder and names the series the service emits.
//!
//! ## Example
//!
//! ```ignore
//! observability::init_metrics_only(9000)?;
//! observability::record_dispatch("released", 12.5);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;

// Re-exports
pub use crate::metrics::{
    record_compensation_failure, record_dispatch, record_finalizer_failure, record_queue_depth,
    record_request, record_target_post, RunningStats, StatsSummary,
};

/// Install the Prometheus recorder with an HTTP listener on `port`
///
/// Tracing must already be initialized.
pub fn init_metrics_only(port: u16) -> Result<()> {
    let builder = PrometheusBuilder::new();
    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
