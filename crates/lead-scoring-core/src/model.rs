//! Model wrapper
//!
//! Owns the loaded model artifact and exposes a single inference operation.
//! The artifact is a JSON envelope carrying a format version, the schema
//! version and feature order it was trained against, and the estimator
//! parameters. Every structural property the inference loop relies on is
//! checked once at load, so `infer` only has to guard the vector shape.
//!
//! # Artifact layout
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "model_version": "2025.03-rf",
//!   "schema_version": "lead-v1",
//!   "feature_names": ["age", "website_visits", "..."],
//!   "estimator": {
//!     "type": "random_forest",
//!     "trees": [
//!       { "nodes": [
//!         { "split": { "feature": 6, "threshold": 0.5, "left": 1, "right": 2 } },
//!         { "leaf": { "value": 0.12 } },
//!         { "leaf": { "value": 0.64 } }
//!       ] }
//!     ]
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Instant;

use crate::encoder::FeatureVector;
use crate::error::{InferenceError, ModelLoadError};
use crate::schema::FeatureSchema;

/// Artifact format understood by this build
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// Inference contract shared by the service and the model wrapper
pub trait Classifier: Send + Sync {
    /// Length of the feature vectors this classifier accepts
    fn feature_count(&self) -> usize;

    /// Positive-class probability for one feature vector
    fn infer(&self, features: &FeatureVector) -> Result<f64, InferenceError>;
}

/// On-disk artifact envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub model_version: String,
    pub schema_version: String,
    pub feature_names: Vec<String>,
    pub estimator: Estimator,
}

/// Estimator parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    RandomForest {
        trees: Vec<DecisionTree>,
    },
}

impl Estimator {
    pub fn kind(&self) -> &'static str {
        match self {
            Estimator::LogisticRegression { .. } => "logistic_regression",
            Estimator::RandomForest { .. } => "random_forest",
        }
    }

    fn check(&self, n_features: usize) -> Result<(), ModelLoadError> {
        match self {
            Estimator::LogisticRegression {
                coefficients,
                intercept,
            } => {
                if coefficients.len() != n_features {
                    return Err(ModelLoadError::corrupt(format!(
                        "logistic regression has {} coefficients for {} features",
                        coefficients.len(),
                        n_features
                    )));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err(ModelLoadError::corrupt(
                        "logistic regression has non-finite parameters",
                    ));
                }
                Ok(())
            }
            Estimator::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(ModelLoadError::corrupt("random forest has no trees"));
                }
                for (index, tree) in trees.iter().enumerate() {
                    tree.check(n_features)
                        .map_err(|e| ModelLoadError::corrupt(format!("tree {}: {}", index, e)))?;
                }
                Ok(())
            }
        }
    }

    fn score(&self, x: &[f64]) -> f64 {
        match self {
            Estimator::LogisticRegression {
                coefficients,
                intercept,
            } => {
                let z = coefficients
                    .iter()
                    .zip(x)
                    .fold(*intercept, |acc, (c, v)| acc + c * v);
                sigmoid(z)
            }
            Estimator::RandomForest { trees } => {
                let total: f64 = trees.iter().map(|t| t.predict(x)).sum();
                total / trees.len() as f64
            }
        }
    }
}

/// A single decision tree stored as a flat node array; node 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// Go `left` when `x[feature] <= threshold`, otherwise `right`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Positive-class probability at this leaf
    Leaf { value: f64 },
}

impl DecisionTree {
    /// Children must point strictly forward, which rules out cycles and bounds traversal depth
    fn check(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = self.nodes.len();
        for (index, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= n_features {
                        return Err(format!(
                            "node {} splits on feature {} of {}",
                            index, feature, n_features
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", index));
                    }
                    for child in [left, right] {
                        if child <= index || child >= len {
                            return Err(format!(
                                "node {} has invalid child index {}",
                                index, child
                            ));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if !(0.0..=1.0).contains(&value) {
                        return Err(format!("leaf {} has value {} outside [0, 1]", index, value));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[feature] <= threshold { left } else { right };
                }
                Node::Leaf { value } => return value,
            }
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Identity of the loaded model, reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_version: String,
    pub schema_version: String,
    pub estimator: String,
    pub feature_count: usize,
    /// SHA-256 of the artifact bytes, hex encoded
    pub fingerprint: String,
}

/// Loaded, validated, read-only model
#[derive(Debug)]
pub struct ModelWrapper {
    info: ModelInfo,
    estimator: Estimator,
}

impl ModelWrapper {
    /// Load and validate an artifact from disk
    ///
    /// When `expected_sha256` is given, the artifact bytes must hash to it.
    pub fn load(
        path: impl AsRef<Path>,
        schema: &FeatureSchema,
        expected_sha256: Option<&str>,
    ) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let start = Instant::now();

        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ModelLoadError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ModelLoadError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let fingerprint = fingerprint(&bytes);
        if let Some(expected) = expected_sha256 {
            if !expected.trim().eq_ignore_ascii_case(&fingerprint) {
                return Err(ModelLoadError::ChecksumMismatch {
                    expected: expected.trim().to_lowercase(),
                    actual: fingerprint,
                });
            }
        }

        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
        let model = Self::from_artifact(artifact, schema, fingerprint)?;

        tracing::info!(
            path = %path.display(),
            model_version = %model.info.model_version,
            estimator = %model.info.estimator,
            fingerprint = %model.info.fingerprint,
            duration_ms = %start.elapsed().as_millis(),
            "Model artifact loaded"
        );

        Ok(model)
    }

    /// Validate an in-memory artifact against the schema
    pub fn from_artifact(
        artifact: ModelArtifact,
        schema: &FeatureSchema,
        fingerprint: String,
    ) -> Result<Self, ModelLoadError> {
        schema.verify().map_err(|e| {
            ModelLoadError::corrupt(format!("schema '{}' is inconsistent: {}", schema.version(), e))
        })?;

        if artifact.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ModelLoadError::IncompatibleFormat {
                found: artifact.format_version,
                supported: SUPPORTED_FORMAT_VERSION,
            });
        }

        if artifact.schema_version != schema.version() {
            return Err(ModelLoadError::SchemaVersionMismatch {
                expected: schema.version().to_string(),
                found: artifact.schema_version,
            });
        }

        let expected = schema.feature_names();
        if artifact.feature_names.len() != expected.len() {
            return Err(ModelLoadError::FeatureOrderMismatch(format!(
                "artifact has {} features, schema has {}",
                artifact.feature_names.len(),
                expected.len()
            )));
        }
        if let Some((position, (found, wanted))) = artifact
            .feature_names
            .iter()
            .zip(&expected)
            .enumerate()
            .find(|(_, (found, wanted))| found.as_str() != **wanted)
        {
            return Err(ModelLoadError::FeatureOrderMismatch(format!(
                "column {} is '{}', schema expects '{}'",
                position, found, wanted
            )));
        }

        artifact.estimator.check(expected.len())?;

        Ok(Self {
            info: ModelInfo {
                model_version: artifact.model_version,
                schema_version: artifact.schema_version,
                estimator: artifact.estimator.kind().to_string(),
                feature_count: expected.len(),
                fingerprint,
            },
            estimator: artifact.estimator,
        })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }
}

impl Classifier for ModelWrapper {
    fn feature_count(&self) -> usize {
        self.info.feature_count
    }

    fn infer(&self, features: &FeatureVector) -> Result<f64, InferenceError> {
        let x = features.as_slice();
        if x.len() != self.info.feature_count {
            return Err(InferenceError::ShapeMismatch {
                expected: self.info.feature_count,
                actual: x.len(),
            });
        }
        if let Some(index) = x.iter().position(|v| !v.is_finite()) {
            return Err(InferenceError::NonFiniteInput { index });
        }

        let probability = self.estimator.score(x);
        if !probability.is_finite() {
            return Err(InferenceError::NonFiniteOutput);
        }
        Ok(probability.clamp(0.0, 1.0))
    }
}

/// SHA-256 of the artifact bytes, hex encoded
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Category, FieldKind, FieldSpec, Scaling, LEAD_SCHEMA};
    use std::io::Write;

    fn feature_names() -> Vec<String> {
        LEAD_SCHEMA
            .feature_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn logistic_artifact() -> ModelArtifact {
        let mut coefficients = vec![0.0; 16];
        coefficients[6] = 2.0; // first_interaction_website
        ModelArtifact {
            format_version: 1,
            model_version: "test-lr".to_string(),
            schema_version: "lead-v1".to_string(),
            feature_names: feature_names(),
            estimator: Estimator::LogisticRegression {
                coefficients,
                intercept: -1.0,
            },
        }
    }

    fn forest_artifact() -> ModelArtifact {
        ModelArtifact {
            format_version: 1,
            model_version: "test-rf".to_string(),
            schema_version: "lead-v1".to_string(),
            feature_names: feature_names(),
            estimator: Estimator::RandomForest {
                trees: vec![
                    DecisionTree {
                        nodes: vec![
                            Node::Split {
                                feature: 2,
                                threshold: 400.0,
                                left: 1,
                                right: 2,
                            },
                            Node::Leaf { value: 0.1 },
                            Node::Leaf { value: 0.7 },
                        ],
                    },
                    DecisionTree {
                        nodes: vec![Node::Leaf { value: 0.3 }],
                    },
                ],
            },
        }
    }

    fn vector_with(index: usize, value: f64) -> FeatureVector {
        let mut x = vec![0.0; 16];
        x[index] = value;
        FeatureVector::from(x)
    }

    #[test]
    fn test_logistic_regression_inference() {
        let model =
            ModelWrapper::from_artifact(logistic_artifact(), &LEAD_SCHEMA, "x".to_string())
                .unwrap();

        let p = model.infer(&vector_with(6, 1.0)).unwrap();
        assert!((p - sigmoid(1.0)).abs() < 1e-12);

        let p = model.infer(&vector_with(6, 0.0)).unwrap();
        assert!((p - sigmoid(-1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_random_forest_averages_trees() {
        let model =
            ModelWrapper::from_artifact(forest_artifact(), &LEAD_SCHEMA, "x".to_string()).unwrap();

        let low = model.infer(&vector_with(2, 400.0)).unwrap();
        assert!((low - 0.2).abs() < 1e-12);

        let high = model.infer(&vector_with(2, 400.5)).unwrap();
        assert!((high - 0.5).abs() < 1e-12);
        assert_eq!(model.info().estimator, "random_forest");
    }

    #[test]
    fn test_infer_rejects_wrong_shape() {
        let model =
            ModelWrapper::from_artifact(forest_artifact(), &LEAD_SCHEMA, "x".to_string()).unwrap();
        let err = model.infer(&FeatureVector::from(vec![1.0; 3])).unwrap_err();
        assert_eq!(
            err,
            InferenceError::ShapeMismatch {
                expected: 16,
                actual: 3
            }
        );
    }

    #[test]
    fn test_infer_rejects_non_finite_input() {
        let model =
            ModelWrapper::from_artifact(forest_artifact(), &LEAD_SCHEMA, "x".to_string()).unwrap();
        let err = model.infer(&vector_with(4, f64::NAN)).unwrap_err();
        assert_eq!(err, InferenceError::NonFiniteInput { index: 4 });
    }

    #[test]
    fn test_rejects_schema_version_mismatch() {
        let mut artifact = forest_artifact();
        artifact.schema_version = "lead-v2".to_string();
        let err = ModelWrapper::from_artifact(artifact, &LEAD_SCHEMA, "x".to_string()).unwrap_err();
        assert!(matches!(err, ModelLoadError::SchemaVersionMismatch { .. }));
    }

    #[test]
    fn test_rejects_reordered_features() {
        let mut artifact = forest_artifact();
        artifact.feature_names.swap(0, 1);
        let err = ModelWrapper::from_artifact(artifact, &LEAD_SCHEMA, "x".to_string()).unwrap_err();
        match err {
            ModelLoadError::FeatureOrderMismatch(msg) => assert!(msg.contains("column 0")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_inconsistent_schema() {
        static CLASHING: &[FieldSpec] = &[
            FieldSpec {
                name: "referral_yes",
                aliases: &[],
                kind: FieldKind::Numeric {
                    min: 0.0,
                    max: 1.0,
                    integer: true,
                    scaling: Scaling::Identity,
                },
                default: None,
                description: "",
            },
            FieldSpec {
                name: "referral",
                aliases: &[],
                kind: FieldKind::Categorical {
                    categories: &[Category::reference("No"), Category::column("Yes", "referral_yes")],
                },
                default: None,
                description: "",
            },
        ];
        let schema = FeatureSchema::new("clash-v1", CLASHING);
        let artifact = ModelArtifact {
            format_version: 1,
            model_version: "clash".to_string(),
            schema_version: "clash-v1".to_string(),
            feature_names: vec!["referral_yes".to_string(), "referral_yes".to_string()],
            estimator: Estimator::LogisticRegression {
                coefficients: vec![0.0, 0.0],
                intercept: 0.0,
            },
        };

        let err = ModelWrapper::from_artifact(artifact, &schema, "00".to_string()).unwrap_err();
        assert!(
            matches!(err, ModelLoadError::Corrupt(ref msg) if msg.contains("duplicate feature column")),
            "{err}"
        );
    }

    #[test]
    fn test_rejects_unsupported_format() {
        let mut artifact = forest_artifact();
        artifact.format_version = 7;
        let err = ModelWrapper::from_artifact(artifact, &LEAD_SCHEMA, "x".to_string()).unwrap_err();
        assert!(matches!(
            err,
            ModelLoadError::IncompatibleFormat {
                found: 7,
                supported: 1
            }
        ));
    }

    #[test]
    fn test_rejects_backward_child_pointer() {
        let mut artifact = forest_artifact();
        artifact.estimator = Estimator::RandomForest {
            trees: vec![DecisionTree {
                nodes: vec![
                    Node::Split {
                        feature: 0,
                        threshold: 1.0,
                        left: 0,
                        right: 1,
                    },
                    Node::Leaf { value: 0.5 },
                ],
            }],
        };
        let err = ModelWrapper::from_artifact(artifact, &LEAD_SCHEMA, "x".to_string()).unwrap_err();
        assert!(matches!(err, ModelLoadError::Corrupt(_)));
    }

    #[test]
    fn test_rejects_leaf_outside_unit_interval() {
        let mut artifact = forest_artifact();
        artifact.estimator = Estimator::RandomForest {
            trees: vec![DecisionTree {
                nodes: vec![Node::Leaf { value: 1.5 }],
            }],
        };
        let err = ModelWrapper::from_artifact(artifact, &LEAD_SCHEMA, "x".to_string()).unwrap_err();
        assert!(matches!(err, ModelLoadError::Corrupt(_)));
    }

    #[test]
    fn test_rejects_coefficient_count_mismatch() {
        let mut artifact = logistic_artifact();
        artifact.estimator = Estimator::LogisticRegression {
            coefficients: vec![1.0; 4],
            intercept: 0.0,
        };
        let err = ModelWrapper::from_artifact(artifact, &LEAD_SCHEMA, "x".to_string()).unwrap_err();
        assert!(matches!(err, ModelLoadError::Corrupt(_)));
    }

    #[test]
    fn test_load_from_file_records_fingerprint() {
        let bytes = serde_json::to_vec(&forest_artifact()).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let model = ModelWrapper::load(file.path(), &LEAD_SCHEMA, None).unwrap();
        assert_eq!(model.info().fingerprint, fingerprint(&bytes));
        assert_eq!(model.info().fingerprint.len(), 64);
        assert_eq!(model.info().model_version, "test-rf");
    }

    #[test]
    fn test_load_verifies_checksum() {
        let bytes = serde_json::to_vec(&forest_artifact()).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let expected = fingerprint(&bytes).to_uppercase();
        assert!(ModelWrapper::load(file.path(), &LEAD_SCHEMA, Some(&expected)).is_ok());

        let err = ModelWrapper::load(file.path(), &LEAD_SCHEMA, Some("deadbeef")).unwrap_err();
        assert!(matches!(err, ModelLoadError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelWrapper::load(dir.path().join("model.json"), &LEAD_SCHEMA, None).unwrap_err();
        assert!(matches!(err, ModelLoadError::NotFound { .. }));
    }

    #[test]
    fn test_load_corrupt_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x80\x04\x95pickle").unwrap();
        let err = ModelWrapper::load(file.path(), &LEAD_SCHEMA, None).unwrap_err();
        assert!(matches!(err, ModelLoadError::Corrupt(_)));
    }

    #[test]
    fn test_artifact_json_layout() {
        let json = serde_json::to_value(forest_artifact()).unwrap();
        assert_eq!(json["estimator"]["type"], "random_forest");
        assert_eq!(json["estimator"]["trees"][0]["nodes"][1]["leaf"]["value"], 0.1);
        assert_eq!(json["estimator"]["trees"][0]["nodes"][0]["split"]["feature"], 2);
    }
}
