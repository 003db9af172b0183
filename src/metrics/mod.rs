//! Prometheus metrics for generation runs, providers and the HTTP API
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for orchestrator and provider metrics
struct GenerationMetrics {
    runs: CounterVec,
    run_duration: HistogramVec,
    run_in_flight: Gauge,
    provider_attempts: CounterVec,
    provider_failures: CounterVec,
    provider_exhausted: CounterVec,
    translation_fallbacks: Counter,
    articles_persisted: CounterVec,
    duplicates_suppressed: CounterVec,
    tokens: CounterVec,
}

/// Container for HTTP API metrics
struct ApiMetrics {
    requests: CounterVec,
    duration: HistogramVec,
}

static GENERATION_METRICS: OnceLock<GenerationMetrics> = OnceLock::new();

static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let generation = GenerationMetrics {
        runs: register_counter_vec!(
            "dailyquill_runs_total",
            "Orchestrator runs by trigger and terminal state",
            &["trigger", "outcome"]
        )?,
        run_duration: register_histogram_vec!(
            "dailyquill_run_duration_seconds",
            "Wall-clock duration of orchestrator runs",
            &["trigger"],
            vec![1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0]
        )?,
        run_in_flight: register_gauge!(
            "dailyquill_run_in_flight",
            "Number of orchestrator runs currently executing"
        )?,
        provider_attempts: register_counter_vec!(
            "dailyquill_provider_attempts_total",
            "Provider calls by provider and operation",
            &["provider", "operation"]
        )?,
        provider_failures: register_counter_vec!(
            "dailyquill_provider_failures_total",
            "Failed provider calls by provider and reason",
            &["provider", "reason"]
        )?,
        provider_exhausted: register_counter_vec!(
            "dailyquill_provider_exhausted_total",
            "Requests that failed on every rotation attempt",
            &["operation"]
        )?,
        translation_fallbacks: register_counter!(
            "dailyquill_translation_fallbacks_total",
            "Translations retried as a single chunk after a structural mismatch"
        )?,
        articles_persisted: register_counter_vec!(
            "dailyquill_articles_persisted_total",
            "Committed articles by language and kind",
            &["language", "kind"]
        )?,
        duplicates_suppressed: register_counter_vec!(
            "dailyquill_duplicates_suppressed_total",
            "Inserts short-circuited by the idempotency guard",
            &["language"]
        )?,
        tokens: register_counter_vec!(
            "dailyquill_tokens_total",
            "Tokens accounted for committed articles",
            &["direction"]
        )?,
    };

    let api = ApiMetrics {
        requests: register_counter_vec!(
            "dailyquill_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        duration: register_histogram_vec!(
            "dailyquill_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0]
        )?,
    };

    GENERATION_METRICS
        .set(generation)
        .map_err(|_| "Generation metrics already initialized")?;
    API_METRICS
        .set(api)
        .map_err(|_| "API metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    GENERATION_METRICS.get().is_some() && API_METRICS.get().is_some()
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

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a run timer and mark a run as in flight until the guard drops
pub fn start_run_timer(trigger: &str) -> MetricsTimer {
    match GENERATION_METRICS.get() {
        Some(m) => MetricsTimer::new(m.run_duration.with_label_values(&[trigger]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

/// Track the number of in-flight runs
pub fn set_run_in_flight(in_flight: bool) {
    if let Some(m) = GENERATION_METRICS.get() {
        if in_flight {
            m.run_in_flight.inc();
        } else {
            m.run_in_flight.dec();
        }
    }
}

/// Record a finished run
pub fn record_run(trigger: &str, outcome: &str) {
    if let Some(m) = GENERATION_METRICS.get() {
        m.runs.with_label_values(&[trigger, outcome]).inc();
    }
}

/// Record one provider call
pub fn record_provider_attempt(provider: &str, operation: &str) {
    if let Some(m) = GENERATION_METRICS.get() {
        m.provider_attempts
            .with_label_values(&[provider, operation])
            .inc();
    }
}

/// Record a failed provider call
pub fn record_provider_failure(provider: &str, reason: &str) {
    if let Some(m) = GENERATION_METRICS.get() {
        m.provider_failures
            .with_label_values(&[provider, reason])
            .inc();
    }
}

/// Record a request that exhausted the rotation
pub fn record_provider_exhausted(operation: &str) {
    if let Some(m) = GENERATION_METRICS.get() {
        m.provider_exhausted.with_label_values(&[operation]).inc();
    }
}

/// Record a single-chunk translation fallback
pub fn record_translation_fallback() {
    if let Some(m) = GENERATION_METRICS.get() {
        m.translation_fallbacks.inc();
    }
}

/// Record a committed article and the tokens it accounted for
pub fn record_article_persisted(language: &str, kind: &str, tokens_in: u64, tokens_out: u64) {
    let Some(m) = GENERATION_METRICS.get() else {
        return;
    };

    m.articles_persisted
        .with_label_values(&[language, kind])
        .inc();
    if tokens_in > 0 {
        m.tokens
            .with_label_values(&["in"])
            .inc_by(tokens_in as f64);
    }
    if tokens_out > 0 {
        m.tokens
            .with_label_values(&["out"])
            .inc_by(tokens_out as f64);
    }
}

/// Record an insert suppressed by the idempotency guard
pub fn record_duplicate(language: &str) {
    if let Some(m) = GENERATION_METRICS.get() {
        m.duplicates_suppressed.with_label_values(&[language]).inc();
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================
