//! Service configuration
//!
//! Layering, lowest to highest priority: built-in defaults, an optional
//! TOML/YAML/JSON file, then CLI flags (each with an environment fallback).

use clap::{Args, ValueEnum};
use lead_scoring_core::DecisionThreshold;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub model_path: PathBuf,
    pub model_sha256: Option<String>,
    pub threshold: f64,
    pub host: String,
    pub port: u16,
    pub request_timeout_ms: u64,
    /// Seconds between liveness canaries; 0 disables them
    pub liveness_interval_secs: u64,
    pub max_batch_size: usize,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/model.json"),
            model_sha256: None,
            threshold: 0.5,
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_ms: 10_000,
            liveness_interval_secs: 30,
            max_batch_size: 1000,
            log_format: LogFormat::Json,
        }
    }
}

impl ServiceConfig {
    /// Load from a file, format chosen by extension
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string())),
            _ => toml::from_str(&content).map_err(|e| parse_err(e.to_string())),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decision_threshold()?;
        self.bind_addr()?;
        if self.port == 0 {
            return Err(ConfigError::invalid("port", "must be non-zero"));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::invalid("max_batch_size", "must be at least 1"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::invalid("request_timeout_ms", "must be non-zero"));
        }
        if let Some(sha) = &self.model_sha256 {
            let sha = sha.trim();
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::invalid(
                    "model_sha256",
                    "must be 64 hexadecimal characters",
                ));
            }
        }
        Ok(())
    }

    pub fn decision_threshold(&self) -> Result<DecisionThreshold, ConfigError> {
        DecisionThreshold::new(self.threshold)
            .map_err(|e| ConfigError::invalid("threshold", e.to_string()))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::invalid("host", format!("{}: {}", self.host, e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn liveness_interval(&self) -> Option<Duration> {
        (self.liveness_interval_secs > 0).then(|| Duration::from_secs(self.liveness_interval_secs))
    }
}

/// Flags for `lead-scoring serve`
#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Config file (TOML, YAML or JSON)
    #[arg(long, env = "LEAD_SCORING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the model artifact
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Expected SHA-256 of the model artifact
    #[arg(long, env = "MODEL_SHA256")]
    pub model_sha256: Option<String>,

    /// Probability at or above which a lead is labelled 1
    #[arg(long, env = "DECISION_THRESHOLD")]
    pub threshold: Option<f64>,

    /// Host to bind to
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    /// Seconds between liveness checks (0 disables)
    #[arg(long, env = "LIVENESS_INTERVAL_SECS")]
    pub liveness_interval_secs: Option<u64>,

    /// Maximum records per batch request
    #[arg(long, env = "MAX_BATCH_SIZE")]
    pub max_batch_size: Option<usize>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,
}

impl ServeArgs {
    /// Merge file and flags over the defaults, then validate
    pub fn resolve(self) -> Result<ServiceConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        };

        if let Some(v) = self.model_path {
            config.model_path = v;
        }
        if let Some(v) = self.model_sha256 {
            config.model_sha256 = Some(v);
        }
        if let Some(v) = self.threshold {
            config.threshold = v;
        }
        if let Some(v) = self.host {
            config.host = v;
        }
        if let Some(v) = self.port {
            config.port = v;
        }
        if let Some(v) = self.request_timeout_ms {
            config.request_timeout_ms = v;
        }
        if let Some(v) = self.liveness_interval_secs {
            config.liveness_interval_secs = v;
        }
        if let Some(v) = self.max_batch_size {
            config.max_batch_size = v;
        }
        if let Some(v) = self.log_format {
            config.log_format = v;
        }

        config.validate()?;
        Ok(config)
    }
}
