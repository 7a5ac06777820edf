//! HTTP surface of the prediction service
//!
//! - `routes`: router, shared state and endpoint handlers
//! - `middleware`: request id propagation, request logging, metrics and readiness gating

pub mod middleware;
pub mod routes;

pub use middleware::{
    metrics_middleware, readiness_gate, request_logging_middleware, REQUEST_ID_HEADER,
};
pub use routes::{create_router, AppState, MAX_BODY_BYTES};

use lead_scoring_core::PredictionResult;
use serde::{Deserialize, Serialize};

use crate::state::HealthState;

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

/// `POST /predict/batch` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub predictions: Vec<PredictionResult>,
}

/// `GET /`
#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub status: HealthState,
    pub started_at: String,
    pub uptime_secs: u64,
    pub threshold: f64,
    pub max_batch_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub model_version: String,
    pub schema_version: String,
    pub estimator: String,
    pub fingerprint: String,
}
