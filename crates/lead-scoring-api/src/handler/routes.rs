//! Route definitions for the prediction service
//!
//! - POST /predict - score one lead record
//! - POST /predict/batch - score up to `max_batch_size` records, all-or-nothing
//! - GET /health - readiness probe, never touches the model
//! - GET / - service and model information
//! - GET /schema - the active feature schema
//! - GET /metrics - Prometheus text exposition
//!
//! Predictions are refused with `503` until a model has been installed, and
//! again for good once the instance is marked unhealthy. The refusal happens
//! in [`readiness_gate`], ahead of body extraction. Bodies over
//! [`MAX_BODY_BYTES`] are rejected as malformed.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use lead_scoring_core::{
    encode, DecisionThreshold, FeatureSchema, PredictionResult, ValidatedLead,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::{
    metrics_middleware, readiness_gate, request_logging_middleware, BatchResponse,
    HealthResponse, InfoResponse, ModelSummary,
};
use crate::error::{ApiError, Result};
use crate::metrics::ScoringMetricsRegistry;
use crate::state::{AlreadyInstalled, HealthState, LoadedModel, ServiceHealth};

/// Largest request body accepted by the prediction routes
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// State shared by every route
pub struct AppState {
    pub schema: &'static FeatureSchema,
    pub threshold: DecisionThreshold,
    pub max_batch_size: usize,
    pub health: ServiceHealth,
    pub metrics: Arc<ScoringMetricsRegistry>,
    pub started_at: DateTime<Utc>,
    start_time: Instant,
}

impl AppState {
    pub fn new(
        schema: &'static FeatureSchema,
        threshold: DecisionThreshold,
        max_batch_size: usize,
        metrics: Arc<ScoringMetricsRegistry>,
    ) -> Self {
        metrics.scoring().set_health(HealthState::Starting);
        Self {
            schema,
            threshold,
            max_batch_size,
            health: ServiceHealth::new(),
            metrics,
            started_at: Utc::now(),
            start_time: Instant::now(),
        }
    }

    /// Publish a loaded model; the instance becomes ready unless already unhealthy
    pub fn install_model(&self, model: LoadedModel) -> std::result::Result<HealthState, AlreadyInstalled> {
        let model_version = model.info.model_version.clone();
        let state = self.health.install(model)?;
        self.metrics.scoring().set_health(state);
        tracing::info!(model_version = %model_version, status = %state, "Model installed");
        Ok(state)
    }

    /// Terminal: the instance stops serving predictions until restarted
    pub fn mark_unhealthy(&self, reason: &str) {
        if self.health.mark_unhealthy() {
            tracing::error!(reason = %reason, "Instance marked unhealthy");
        }
        self.metrics.scoring().set_health(HealthState::Unhealthy);
    }

    fn ready_model(&self) -> Result<&LoadedModel> {
        self.health
            .ready_model()
            .ok_or_else(|| ApiError::Unavailable(self.health.state()))
    }

    fn validate(&self, record: &Map<String, Value>) -> Result<ValidatedLead<'static>> {
        let schema: &'static FeatureSchema = self.schema;
        schema.validate(record).map_err(|err| {
            self.metrics
                .scoring()
                .record_validation_failure(&err.field, err.kind.as_str());
            tracing::debug!(field = %err.field, kind = %err.kind, "Record rejected");
            ApiError::from(err)
        })
    }
}

/// Create the router with all routes and layers
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let predictions: Router<Arc<AppState>> = Router::new()
        .route("/predict", post(predict))
        .route("/predict/", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route_layer(from_fn_with_state(Arc::clone(&state), readiness_gate))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/schema", get(feature_schema))
        .route("/metrics", get(metrics_text))
        .merge(predictions)
        .route_layer(from_fn_with_state(Arc::clone(&state), metrics_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_logging_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.health.state();
    let code = match status {
        HealthState::Ready => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = HealthResponse {
        status,
        model_version: state.health.model().map(|m| m.info.model_version.clone()),
    };
    (code, Json(body))
}

/// POST /predict
pub async fn predict(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<PredictionResult>> {
    let classifier = Arc::clone(&state.ready_model()?.classifier);
    let body = body?;
    let record = parse_record(&body)?;
    let lead = state.validate(&record)?;

    let metrics = Arc::clone(&state.metrics);
    let probability = tokio::task::spawn_blocking(move || {
        let _timer = metrics.scoring().start_timer();
        classifier.infer(&encode(&lead))
    })
    .await
    .map_err(|e| ApiError::internal(format!("Inference task failed: {}", e)))?
    .map_err(|e| {
        tracing::error!(error = %e, "Inference contract violated");
        ApiError::from(e)
    })?;

    let result = PredictionResult::from_probability(probability, state.threshold);
    state.metrics.scoring().record_prediction(result.label);
    Ok(Json(result))
}

/// POST /predict/batch
pub async fn predict_batch(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<BatchResponse>> {
    let classifier = Arc::clone(&state.ready_model()?.classifier);
    let body = body?;

    let records = match parse_json(&body)? {
        Value::Array(records) => records,
        _ => return Err(ApiError::malformed("Request body must be a JSON array of records")),
    };
    if records.is_empty() {
        return Err(ApiError::malformed("Batch must contain at least one record"));
    }
    if records.len() > state.max_batch_size {
        return Err(ApiError::malformed(format!(
            "Batch of {} records exceeds the limit of {}",
            records.len(),
            state.max_batch_size
        )));
    }

    let leads = records
        .iter()
        .enumerate()
        .map(|(index, raw)| match raw {
            Value::Object(record) => state.validate(record).map_err(|e| e.at_index(index)),
            _ => Err(ApiError::malformed("Record must be a JSON object").at_index(index)),
        })
        .collect::<Result<Vec<_>>>()?;

    let metrics = Arc::clone(&state.metrics);
    let probabilities = tokio::task::spawn_blocking(move || {
        leads
            .iter()
            .map(|lead| {
                let _timer = metrics.scoring().start_timer();
                classifier.infer(&encode(lead))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
    })
    .await
    .map_err(|e| ApiError::internal(format!("Inference task failed: {}", e)))?
    .map_err(|e| {
        tracing::error!(error = %e, "Inference contract violated");
        ApiError::from(e)
    })?;

    let predictions: Vec<PredictionResult> = probabilities
        .into_iter()
        .map(|p| PredictionResult::from_probability(p, state.threshold))
        .collect();
    for prediction in &predictions {
        state.metrics.scoring().record_prediction(prediction.label);
    }

    tracing::debug!(count = predictions.len(), "Batch scored");
    Ok(Json(BatchResponse { predictions }))
}

/// GET /
pub async fn service_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let model = state.health.model().map(|m| ModelSummary {
        model_version: m.info.model_version.clone(),
        schema_version: m.info.schema_version.clone(),
        estimator: m.info.estimator.clone(),
        fingerprint: m.info.fingerprint.clone(),
    });

    Json(InfoResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: state.health.state(),
        started_at: state.started_at.to_rfc3339(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        threshold: state.threshold.value(),
        max_batch_size: state.max_batch_size,
        model,
    })
}

/// GET /schema
pub async fn feature_schema(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.schema.describe())
}

/// GET /metrics
pub async fn metrics_text(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let text = state
        .metrics
        .encode_text()
        .map_err(|e| ApiError::internal(format!("Failed to encode metrics: {}", e)))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        text,
    ))
}

fn parse_json(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::malformed(format!("Request body is not valid JSON: {}", e)))
}

fn parse_record(body: &[u8]) -> Result<Map<String, Value>> {
    match parse_json(body)? {
        Value::Object(record) => Ok(record),
        _ => Err(ApiError::malformed("Request body must be a JSON object")),
    }
}
