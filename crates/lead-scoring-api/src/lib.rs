//! Lead Scoring API
//!
//! HTTP prediction service over [`lead_scoring_core`]. The service binds
//! immediately, reports `starting` on `/health` while the model artifact
//! loads, and only then accepts `/predict` traffic.
//!
//! # Example
//!
//! ```rust,no_run
//! use lead_scoring_api::{lifecycle, ServiceConfig};
//!
//! # async fn run() -> Result<(), lead_scoring_api::ServeError> {
//! let config = ServiceConfig {
//!     model_path: "model/model.json".into(),
//!     ..Default::default()
//! };
//! lifecycle::serve(config).await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod metrics;
pub mod state;

pub use config::{LogFormat, ServeArgs, ServiceConfig};
pub use error::{ApiError, ConfigError, ServeError};
pub use handler::{create_router, AppState, MAX_BODY_BYTES};
pub use metrics::{ScoringMetrics, ScoringMetricsRegistry};
pub use state::{HealthState, LoadedModel, ServiceHealth};
