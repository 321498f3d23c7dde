//! Metrics for image generation requests
//!
//! Each logical generation (one submission plus its polling) gets a
//! [`GenerationMetrics`] tracker that records exactly one outcome.
//!
//! # Metrics
//!
//! - `generation_submissions_total`: Counter of submissions, labeled by model
//! - `generation_outcomes_total`: Counter of settled generations by outcome
//! - `generation_duration_seconds`: Histogram of submit-to-settle duration
//! - `generation_active_count`: Gauge of in-flight generations
//!
//! # Examples
//!
//! ```
//! use fallab::metrics::GenerationMetrics;
//!
//! let metrics = GenerationMetrics::new("flux-kontext");
//! metrics.record_outcome("completed");
//! ```

use metrics::{decrement_gauge, histogram, increment_counter, increment_gauge};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Metrics tracker for a single generation
///
/// Records through `&self` so it can be moved into a spawned task and
/// settled from there. The active gauge is released on drop if no
/// outcome was recorded.
#[derive(Debug)]
pub struct GenerationMetrics {
    model_id: String,
    start: Instant,
    recorded: AtomicBool,
}

impl GenerationMetrics {
    /// Starts tracking a generation for `model_id`
    ///
    /// Increments the submission counter and the active gauge.
    pub fn new(model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        increment_counter!("generation_submissions_total", "model" => model_id.clone());
        increment_gauge!("generation_active_count", 1.0);

        Self {
            model_id,
            start: Instant::now(),
            recorded: AtomicBool::new(false),
        }
    }

    /// Records how the generation settled
    ///
    /// `outcome` is one of `completed`, `failed`, `timeout` or `cancelled`.
    /// Only the first call has any effect.
    pub fn record_outcome(&self, outcome: &str) {
        if self.recorded.swap(true, Ordering::SeqCst) {
            return;
        }

        histogram!(
            "generation_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "model" => self.model_id.clone(),
            "outcome" => outcome.to_string()
        );

        increment_counter!(
            "generation_outcomes_total",
            "model" => self.model_id.clone(),
            "outcome" => outcome.to_string()
        );

        decrement_gauge!("generation_active_count", 1.0);
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Time since the generation was submitted
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    pub(crate) fn is_recorded(&self) -> bool {
        self.recorded.load(Ordering::SeqCst)
    }
}

impl Drop for GenerationMetrics {
    fn drop(&mut self) {
        if !self.is_recorded() {
            decrement_gauge!("generation_active_count", 1.0);
        }
    }
}

/// Installs the Prometheus exporter when built with the `prometheus` feature
///
/// A no-op otherwise; safe to call either way.
///
/// # Examples
///
/// ```
/// use fallab::metrics::init_metrics_exporter;
///
/// init_metrics_exporter();
/// ```
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
