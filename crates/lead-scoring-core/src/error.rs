//! Error taxonomy for the scoring pipeline
//!
//! Three families, one per stage:
//! - [`SchemaError`]: the submitted record does not match the feature schema
//! - [`ModelLoadError`]: the model artifact could not be acquired (fatal at startup)
//! - [`InferenceError`]: the encoder/model contract was violated (per request)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why a field failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaErrorKind {
    /// Required field absent (or explicitly `null`)
    Missing,
    /// Value has the wrong JSON type, or is fractional where an integer is expected
    InvalidType,
    /// Categorical value outside the declared domain
    OutOfDomain,
    /// Numeric value outside the allowed range
    OutOfRange,
}

impl SchemaErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaErrorKind::Missing => "missing",
            SchemaErrorKind::InvalidType => "invalid_type",
            SchemaErrorKind::OutOfDomain => "out_of_domain",
            SchemaErrorKind::OutOfRange => "out_of_range",
        }
    }
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record failed validation against the feature schema
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct SchemaError {
    /// Canonical name of the offending field
    pub field: String,
    pub kind: SchemaErrorKind,
    /// Human-readable detail, safe to return to the caller
    pub message: String,
}

impl SchemaError {
    pub fn missing(field: &str) -> Self {
        Self {
            field: field.to_string(),
            kind: SchemaErrorKind::Missing,
            message: format!("Required field '{}' is missing", field),
        }
    }

    pub fn invalid_type(field: &str, expected: &str, actual: &str) -> Self {
        Self {
            field: field.to_string(),
            kind: SchemaErrorKind::InvalidType,
            message: format!(
                "Field '{}' has wrong type: expected {}, got {}",
                field, expected, actual
            ),
        }
    }

    pub fn out_of_domain(field: &str, value: &str, domain: &[&str]) -> Self {
        Self {
            field: field.to_string(),
            kind: SchemaErrorKind::OutOfDomain,
            message: format!(
                "Field '{}' has value '{}' which is not one of [{}]",
                field,
                value,
                domain.join(", ")
            ),
        }
    }

    pub fn out_of_range(field: &str, value: f64, min: f64, max: f64) -> Self {
        Self {
            field: field.to_string(),
            kind: SchemaErrorKind::OutOfRange,
            message: format!(
                "Field '{}' has value {} outside the allowed range [{}, {}]",
                field, value, min, max
            ),
        }
    }
}

/// The model artifact could not be loaded
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Model artifact not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read model artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model artifact is corrupt: {0}")]
    Corrupt(String),

    #[error("Unsupported artifact format version {found} (supported: {supported})")]
    IncompatibleFormat { found: u32, supported: u32 },

    #[error("Artifact was trained for schema '{found}', service runs schema '{expected}'")]
    SchemaVersionMismatch { expected: String, found: String },

    #[error("Artifact feature order does not match schema: {0}")]
    FeatureOrderMismatch(String),

    #[error("Artifact checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl ModelLoadError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        ModelLoadError::Corrupt(msg.into())
    }

    /// Short machine-readable code, used for logs and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            ModelLoadError::NotFound { .. } => "not_found",
            ModelLoadError::Io { .. } => "io",
            ModelLoadError::Corrupt(_) => "corrupt",
            ModelLoadError::IncompatibleFormat { .. } => "incompatible_format",
            ModelLoadError::SchemaVersionMismatch { .. } => "schema_version_mismatch",
            ModelLoadError::FeatureOrderMismatch(_) => "feature_order_mismatch",
            ModelLoadError::ChecksumMismatch { .. } => "checksum_mismatch",
        }
    }
}

impl From<serde_json::Error> for ModelLoadError {
    fn from(err: serde_json::Error) -> Self {
        ModelLoadError::Corrupt(format!("JSON error: {}", err))
    }
}

/// Inference was invoked with a vector that breaks the model contract
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Feature vector has {actual} values, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Feature {index} is not a finite number")]
    NonFiniteInput { index: usize },

    #[error("Model produced a non-finite score")]
    NonFiniteOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::missing("first_interaction");
        assert_eq!(err.to_string(), "Required field 'first_interaction' is missing");
        assert_eq!(err.field, "first_interaction");
        assert_eq!(err.kind, SchemaErrorKind::Missing);
    }

    #[test]
    fn test_out_of_domain_lists_domain() {
        let err = SchemaError::out_of_domain("referral", "Maybe", &["No", "Yes"]);
        assert!(err.message.contains("Maybe"));
        assert!(err.message.contains("No, Yes"));
        assert_eq!(err.kind.as_str(), "out_of_domain");
    }

    #[test]
    fn test_model_load_error_codes() {
        let err = ModelLoadError::NotFound {
            path: PathBuf::from("/missing.json"),
        };
        assert_eq!(err.code(), "not_found");
        assert!(err.to_string().contains("/missing.json"));

        let err = ModelLoadError::corrupt("bad tree");
        assert_eq!(err.code(), "corrupt");
    }

    #[test]
    fn test_json_error_is_corrupt() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ModelLoadError = json_err.into();
        assert!(matches!(err, ModelLoadError::Corrupt(_)));
    }
}
