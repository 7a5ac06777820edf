//! Lead Scoring Core
//!
//! Everything needed to turn a raw lead record into a conversion probability:
//!
//! - [`schema`]: the feature schema and the frozen category→column table
//! - [`encoder`]: validated record → ordered feature vector
//! - [`model`]: model artifact loading and inference
//! - [`prediction`]: decision threshold, prediction result, scoring pipeline
//!
//! # Example
//!
//! ```no_run
//! use lead_scoring_core::{score, DecisionThreshold, ModelWrapper, LEAD_SCHEMA};
//! use serde_json::json;
//!
//! let model = ModelWrapper::load("model/model.json", &LEAD_SCHEMA, None)?;
//! let record = json!({
//!     "first_interaction": "Website",
//!     "profile_completed": "High",
//!     "time_spent": 120,
//!     "website_visits": 5
//! });
//! let result = score(
//!     &LEAD_SCHEMA,
//!     &model,
//!     DecisionThreshold::DEFAULT,
//!     record.as_object().unwrap(),
//! )?;
//! println!("p={} label={}", result.probability, result.label);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod encoder;
pub mod error;
pub mod model;
pub mod prediction;
pub mod schema;

pub use encoder::{encode, FeatureVector};
pub use error::{InferenceError, ModelLoadError, SchemaError, SchemaErrorKind};
pub use model::{Classifier, Estimator, ModelArtifact, ModelInfo, ModelWrapper};
pub use prediction::{
    score, score_batch, DecisionThreshold, InvalidThreshold, PredictError, PredictionResult,
};
pub use schema::{FeatureSchema, SchemaDescription, ValidatedLead, LEAD_SCHEMA, SCHEMA_VERSION};

