//! Client for the lead scoring prediction service
//!
//! Predictions can only be sent through a [`ReadyClient`], and the only way
//! to get one is [`PredictionClient::wait_until_ready`], which polls
//! `/health` until the service reports `ready`.
//!
//! ```rust,no_run
//! use lead_scoring_client::{PredictionClient, ReadinessPolicy};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), lead_scoring_client::ClientError> {
//! let client = PredictionClient::from_env()
//!     .wait_until_ready(ReadinessPolicy::default())
//!     .await?;
//! let result = client
//!     .predict(&json!({
//!         "first_interaction": "Website",
//!         "profile_completed": "High",
//!         "time_spent": 120,
//!         "website_visits": 5
//!     }))
//!     .await?;
//! println!("{} -> {}", result.probability, result.label);
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::ClientError;

use lead_scoring_core::PredictionResult;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Environment variable holding the service base URL
pub const SERVICE_URL_ENV: &str = "PREDICTION_SERVICE_URL";
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";

/// Health status reported by `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Starting,
    Ready,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ServiceStatus,
    #[serde(default)]
    pub model_version: Option<String>,
}

/// How long and how often to poll `/health`
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub deadline: Duration,
    pub poll_interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl ReadinessPolicy {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Prediction service client; can check health but not predict
#[derive(Debug, Clone)]
pub struct PredictionClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl PredictionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Base URL from `PREDICTION_SERVICE_URL`, else `http://localhost:8000`
    pub fn from_env() -> Self {
        let url = std::env::var(SERVICE_URL_ENV).unwrap_or_else(|_| DEFAULT_SERVICE_URL.into());
        Self::new(url)
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current health; `503` bodies are parsed too since they carry the status
    pub async fn health(&self) -> Result<HealthReport, ClientError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            response
                .json()
                .await
                .map_err(|e| ClientError::Parse(e.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::Server {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Poll `/health` until `ready`
    ///
    /// Connection failures and `starting` are retried until the deadline;
    /// `unhealthy` fails immediately since it never recovers.
    pub async fn wait_until_ready(self, policy: ReadinessPolicy) -> Result<ReadyClient, ClientError> {
        let start = Instant::now();

        loop {
            let last_status = match self.health().await {
                Ok(report) => match report.status {
                    ServiceStatus::Ready => {
                        tracing::info!(
                            url = %self.base_url,
                            model_version = ?report.model_version,
                            waited_ms = %start.elapsed().as_millis(),
                            "Prediction service ready"
                        );
                        return Ok(ReadyClient { inner: self });
                    }
                    ServiceStatus::Unhealthy => {
                        return Err(ClientError::Unavailable(
                            "service reported unhealthy".to_string(),
                        ));
                    }
                    ServiceStatus::Starting => "starting".to_string(),
                },
                Err(e) => {
                    tracing::debug!(error = %e, "Health poll failed");
                    e.to_string()
                }
            };

            let waited = start.elapsed();
            if waited + policy.poll_interval > policy.deadline {
                return Err(ClientError::NotReady {
                    waited,
                    last_status,
                });
            }
            tokio::time::sleep(policy.poll_interval).await;
        }
    }
}

/// A client that has observed the service as ready
#[derive(Debug, Clone)]
pub struct ReadyClient {
    inner: PredictionClient,
}

impl ReadyClient {
    pub fn client(&self) -> &PredictionClient {
        &self.inner
    }

    /// Score one record
    pub async fn predict<T: Serialize + ?Sized>(
        &self,
        record: &T,
    ) -> Result<PredictionResult, ClientError> {
        self.post("/predict", record).await
    }

    /// Score several records in one all-or-nothing request
    pub async fn predict_batch<T: Serialize>(
        &self,
        records: &[T],
    ) -> Result<Vec<PredictionResult>, ClientError> {
        let batch: BatchResponse = self.post("/predict/batch", records).await?;
        Ok(batch.predictions)
    }

    async fn post<T, R>(&self, path: &str, body: &T) -> Result<R, ClientError>
    where
        T: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.inner.base_url, path);

        let response = self
            .inner
            .client
            .post(&url)
            .json(body)
            .timeout(self.inner.timeout)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ClientError::Parse(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<ErrorBody> = serde_json::from_str(&text).ok();

        match status {
            reqwest::StatusCode::BAD_REQUEST => {
                let body = body.unwrap_or_else(|| ErrorBody {
                    error: text,
                    field: None,
                    index: None,
                });
                Err(ClientError::InvalidInput {
                    field: body.field.unwrap_or_else(|| "body".to_string()),
                    message: body.error,
                    index: body.index,
                })
            }
            reqwest::StatusCode::SERVICE_UNAVAILABLE => Err(ClientError::Unavailable(
                body.map(|b| b.error).unwrap_or(text),
            )),
            _ => Err(ClientError::Server {
                status: status.as_u16(),
                message: body.map(|b| b.error).unwrap_or(text),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    predictions: Vec<PredictionResult>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    index: Option<usize>,
}
