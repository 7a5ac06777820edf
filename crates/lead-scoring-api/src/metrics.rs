//! Prometheus metrics for the prediction service
//!
//! - `lead_scoring_requests_total` (counter) - requests by endpoint and status
//! - `lead_scoring_predictions_total` (counter) - scored leads by label
//! - `lead_scoring_validation_failures_total` (counter) - rejected records by field and kind
//! - `lead_scoring_inference_duration_seconds` (histogram) - encode + infer latency
//! - `lead_scoring_health_state` (gauge) - 0 starting, 1 ready, 2 unhealthy
//! - `lead_scoring_liveness_checks_total` (counter) - canary checks by result

use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::time::Instant;

use crate::state::HealthState;

const NAMESPACE: &str = "lead_scoring";

pub struct ScoringMetrics {
    requests_total: IntCounterVec,
    predictions_total: IntCounterVec,
    validation_failures_total: IntCounterVec,
    inference_duration_seconds: Histogram,
    health_state: Gauge,
    liveness_checks_total: CounterVec,
}

impl ScoringMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "HTTP requests handled").namespace(NAMESPACE),
            &["endpoint", "method", "status"],
        )?;

        let predictions_total = IntCounterVec::new(
            Opts::new("predictions_total", "Leads scored, by predicted label")
                .namespace(NAMESPACE),
            &["label"],
        )?;

        let validation_failures_total = IntCounterVec::new(
            Opts::new(
                "validation_failures_total",
                "Records rejected by the feature schema",
            )
            .namespace(NAMESPACE),
            &["field", "kind"],
        )?;

        let inference_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "inference_duration_seconds",
                "Encode and inference duration in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(vec![
                0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05, 0.1,
            ]),
        )?;

        let health_state = Gauge::with_opts(
            Opts::new(
                "health_state",
                "Service health (0 starting, 1 ready, 2 unhealthy)",
            )
            .namespace(NAMESPACE),
        )?;

        let liveness_checks_total = CounterVec::new(
            Opts::new("liveness_checks_total", "Liveness canary checks").namespace(NAMESPACE),
            &["result"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(predictions_total.clone()))?;
        registry.register(Box::new(validation_failures_total.clone()))?;
        registry.register(Box::new(inference_duration_seconds.clone()))?;
        registry.register(Box::new(health_state.clone()))?;
        registry.register(Box::new(liveness_checks_total.clone()))?;

        Ok(Self {
            requests_total,
            predictions_total,
            validation_failures_total,
            inference_duration_seconds,
            health_state,
            liveness_checks_total,
        })
    }

    pub fn record_request(&self, endpoint: &str, method: &str, status: u16) {
        self.requests_total
            .with_label_values(&[endpoint, method, &status.to_string()])
            .inc();
    }

    pub fn record_prediction(&self, label: u8) {
        let label = if label == 1 { "1" } else { "0" };
        self.predictions_total.with_label_values(&[label]).inc();
    }

    pub fn record_validation_failure(&self, field: &str, kind: &str) {
        self.validation_failures_total
            .with_label_values(&[field, kind])
            .inc();
    }

    pub fn set_health(&self, state: HealthState) {
        self.health_state.set(f64::from(state as u8));
    }

    pub fn record_liveness(&self, passed: bool) {
        let result = if passed { "passed" } else { "failed" };
        self.liveness_checks_total.with_label_values(&[result]).inc();
    }

    /// Start an inference timer (records the duration on drop)
    pub fn start_timer(&self) -> InferenceTimer<'_> {
        InferenceTimer {
            start: Instant::now(),
            metrics: self,
        }
    }
}

/// RAII guard timing one encode + infer
pub struct InferenceTimer<'a> {
    start: Instant,
    metrics: &'a ScoringMetrics,
}

impl Drop for InferenceTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .inference_duration_seconds
            .observe(self.start.elapsed().as_secs_f64());
    }
}

/// Registry owning every service metric
pub struct ScoringMetricsRegistry {
    registry: Registry,
    scoring: ScoringMetrics,
}

impl ScoringMetricsRegistry {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let scoring = ScoringMetrics::new(&registry)?;
        Ok(Self { registry, scoring })
    }

    pub fn scoring(&self) -> &ScoringMetrics {
        &self.scoring
    }

    /// Encode metrics as text for scraping
    pub fn encode_text(&self) -> prometheus::Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
