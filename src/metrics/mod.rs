//! Prometheus metrics for the trend pipeline
//!
//! Tracks:
//! - Polling: cycles per source and outcome, observations saved, fetch duration
//! - Alerts: deliveries per kind and outcome, emerging topics detected
//! - Resilience: circuit breaker state per policy
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails or never happens, metrics operations are no-ops.

use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_gauge_vec,
    CounterVec, Encoder, GaugeVec, HistogramVec, IntGaugeVec, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct PipelineMetrics {
    poll_cycles: CounterVec,
    observations_saved: CounterVec,
    fetch_duration: HistogramVec,
    alerts: CounterVec,
    emerging_topics: GaugeVec,
    breaker_state: IntGaugeVec,
}

static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Outcome label of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Saved,
    Empty,
    FetchFailed,
    StoreFailed,
}

impl PollOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Empty => "empty",
            Self::FetchFailed => "fetch_failed",
            Self::StoreFailed => "store_failed",
        }
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        poll_cycles: register_counter_vec!(
            "trendbot_poll_cycles_total",
            "Poll cycles by source and outcome",
            &["source", "outcome"]
        )?,
        observations_saved: register_counter_vec!(
            "trendbot_observations_saved_total",
            "Observations written to the store by source",
            &["source"]
        )?,
        fetch_duration: register_histogram_vec!(
            "trendbot_fetch_duration_seconds",
            "Source fetch duration in seconds",
            &["source"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        )?,
        alerts: register_counter_vec!(
            "trendbot_alerts_total",
            "Alert deliveries by kind and outcome",
            &["kind", "outcome"]
        )?,
        emerging_topics: register_gauge_vec!(
            "trendbot_emerging_topics",
            "Emerging topics found by the last detection pass",
            &["platform"]
        )?,
        breaker_state: register_int_gauge_vec!(
            "trendbot_circuit_breaker_state",
            "Circuit breaker state (0 = closed, 1 = half-open, 2 = open)",
            &["policy"]
        )?,
    };

    PIPELINE_METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    PIPELINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Write the current metrics to `path` in text format, replacing the file
pub fn export_to_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = encode_metrics()?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Record the outcome of one poll cycle
pub fn record_poll(source: &str, outcome: PollOutcome) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.poll_cycles
            .with_label_values(&[source, outcome.as_str()])
            .inc();
    }
}

/// Record observations written by a source
pub fn record_saved(source: &str, count: usize) {
    let Some(m) = PIPELINE_METRICS.get() else {
        return;
    };

    if count > 0 {
        m.observations_saved
            .with_label_values(&[source])
            .inc_by(count as f64);
    }
}

/// Record how long a fetch took
pub fn record_fetch_duration(source: &str, duration_secs: f64) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.fetch_duration
            .with_label_values(&[source])
            .observe(duration_secs);
    }
}

/// Record an alert delivery
pub fn record_alert(kind: &str, delivered: bool) {
    if let Some(m) = PIPELINE_METRICS.get() {
        let outcome = if delivered { "delivered" } else { "failed" };
        m.alerts.with_label_values(&[kind, outcome]).inc();
    }
}

/// Set the number of emerging topics found for a platform
pub fn set_emerging_topics(platform: &str, count: usize) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.emerging_topics
            .with_label_values(&[platform])
            .set(count as f64);
    }
}

/// Export a breaker state gauge value
pub fn set_breaker_state(policy: &str, state: i64) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.breaker_state.with_label_values(&[policy]).set(state);
    }
}

// ============================================================================
// Tests
// ============================================================================
