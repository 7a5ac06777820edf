use std::time::Duration;
use thiserror::Error;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// The service rejected the input (`400`)
    #[error("Invalid input in field '{field}': {message}")]
    InvalidInput {
        field: String,
        message: String,
        /// Position of the offending record in a batch
        index: Option<usize>,
    },

    /// The service is up but not serving predictions (`503`)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Readiness was not observed before the deadline
    #[error("Service not ready after {waited:?} (last status: {last_status})")]
    NotReady { waited: Duration, last_status: String },

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },
}

impl ClientError {
    /// `true` when resubmitting the same input can never succeed
    pub fn is_user_error(&self) -> bool {
        matches!(self, ClientError::InvalidInput { .. })
    }

    /// `true` when the service could not be reached or was not ready
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ClientError::Network(_) | ClientError::Unavailable(_) | ClientError::NotReady { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let invalid = ClientError::InvalidInput {
            field: "first_interaction".to_string(),
            message: "missing".to_string(),
            index: None,
        };
        assert!(invalid.is_user_error());
        assert!(!invalid.is_unavailable());

        let down = ClientError::Unavailable("starting".to_string());
        assert!(!down.is_user_error());
        assert!(down.is_unavailable());

        let server = ClientError::Server {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!server.is_user_error());
        assert!(!server.is_unavailable());
    }

    #[test]
    fn test_invalid_input_display_names_field() {
        let err = ClientError::InvalidInput {
            field: "referral".to_string(),
            message: "bad value".to_string(),
            index: Some(2),
        };
        assert_eq!(
            err.to_string(),
            "Invalid input in field 'referral': bad value"
        );
    }
}
