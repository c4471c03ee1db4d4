//! Prometheus metrics for the devtools runtime.
//!
//! Recording is always on; without an installed recorder the macros are
//! no-ops. [`MetricsServer`] installs a Prometheus recorder and describes
//! every metric the runtime emits:
//! - Lifted transitions (count by type, duration, history size)
//! - Panel traffic (inbound messages, dropped messages)
//! - Real actions forwarded to the application
//!
//! # Example
//!
//! ```rust,no_run
//! use rewind_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the scrape endpoint is advertised on
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// Only one recorder can be installed per process. A second call (e.g.
    /// from another test) logs a warning and leaves [`Self::handle`] empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5,
                    1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Devtools metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "devtools_lifted_actions_total",
        "Total number of lifted actions applied, by type"
    );
    describe_histogram!(
        "devtools_transition_duration_seconds",
        "Time taken to apply one lifted action"
    );
    describe_gauge!(
        "devtools_staged_actions",
        "Number of staged actions in the current history"
    );
    describe_counter!(
        "devtools_extension_messages_total",
        "Total number of messages received from the devtools panel, by type"
    );
    describe_counter!(
        "devtools_extension_dropped_total",
        "Total number of panel messages dropped (outside a session or undecodable)"
    );
    describe_counter!(
        "devtools_scanned_actions_total",
        "Total number of real actions forwarded to the application"
    );
}

/// Transition metrics recorder.
pub struct TransitionMetrics;

impl TransitionMetrics {
    /// Record one applied lifted action.
    #[allow(clippy::cast_precision_loss)] // history length stays far below 2^52
    pub fn record(kind: &'static str, duration: Duration, staged_actions: usize) {
        counter!("devtools_lifted_actions_total", "type" => kind).increment(1);
        histogram!("devtools_transition_duration_seconds").record(duration.as_secs_f64());
        gauge!("devtools_staged_actions").set(staged_actions as f64);
    }

    /// Record a real action forwarded to the application.
    pub fn record_scanned() {
        counter!("devtools_scanned_actions_total").increment(1);
    }
}
