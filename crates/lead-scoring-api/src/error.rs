//! Error types for the prediction service
//!
//! [`ApiError`] is the HTTP mapping returned by handlers, [`ConfigError`]
//! rejects configuration before the listener binds and [`ServeError`] is
//! everything that can stop `serve`.

use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lead_scoring_core::{InferenceError, ModelLoadError, SchemaError};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::handler::MAX_BODY_BYTES;
use crate::state::HealthState;

/// Request-level failure, rendered as a JSON error body
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// A record failed schema validation
    #[error("{message}")]
    InvalidInput {
        field: String,
        kind: Option<&'static str>,
        message: String,
        index: Option<usize>,
    },

    /// The body is not JSON or not the expected shape
    #[error("{0}")]
    MalformedBody(String),

    /// The instance is not ready to serve predictions
    #[error("Service is {0}")]
    Unavailable(HealthState),

    /// Inference contract violation or other internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        ApiError::MalformedBody(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    /// Attach the position of the offending record in a batch
    pub fn at_index(self, position: usize) -> Self {
        match self {
            ApiError::InvalidInput {
                field,
                kind,
                message,
                ..
            } => ApiError::InvalidInput {
                field,
                kind,
                message,
                index: Some(position),
            },
            ApiError::MalformedBody(message) => ApiError::InvalidInput {
                field: "body".to_string(),
                kind: None,
                message,
                index: Some(position),
            },
            other => other,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput { .. } => "INVALID_INPUT",
            ApiError::MalformedBody(_) => "MALFORMED_BODY",
            ApiError::Unavailable(_) => "UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput { .. } | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let body = match self {
            ApiError::InvalidInput {
                field,
                kind,
                message,
                index,
            } => ErrorBody {
                error: message,
                code,
                field: Some(field),
                kind,
                index,
            },
            ApiError::MalformedBody(message) => ErrorBody {
                error: message,
                code,
                field: Some("body".to_string()),
                kind: None,
                index: None,
            },
            ApiError::Unavailable(state) => ErrorBody {
                error: format!("Model not ready (service is {})", state),
                code,
                field: None,
                kind: None,
                index: None,
            },
            // Detail stays in the logs
            ApiError::Internal(_) => ErrorBody {
                error: "Internal error while scoring the request".to_string(),
                code,
                field: None,
                kind: None,
                index: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        ApiError::InvalidInput {
            field: err.field,
            kind: Some(err.kind.as_str()),
            message: err.message,
            index: None,
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::MalformedBody(format!(
                "Request body exceeds the limit of {} bytes",
                MAX_BODY_BYTES
            ))
        } else {
            ApiError::MalformedBody(format!(
                "Failed to read request body: {}",
                rejection.body_text()
            ))
        }
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Invalid service configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, msg: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            message: msg.into(),
        }
    }
}

/// Anything that stops the service
#[derive(Error, Debug)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Model load failed: {0}")]
    Load(#[from] ModelLoadError),

    #[error("Failed to initialize metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, ApiError>;
