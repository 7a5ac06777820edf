//! Prediction results and the validate → encode → infer pipeline

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::encoder::encode;
use crate::error::{InferenceError, SchemaError};
use crate::model::Classifier;
use crate::schema::FeatureSchema;

/// Probability cut-off for the positive label, fixed per process
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DecisionThreshold(f64);

impl DecisionThreshold {
    pub const DEFAULT: DecisionThreshold = DecisionThreshold(0.5);

    pub fn new(value: f64) -> Result<Self, InvalidThreshold> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidThreshold(value))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for DecisionThreshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl<'de> Deserialize<'de> for DecisionThreshold {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        DecisionThreshold::new(value).map_err(serde::de::Error::custom)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("Decision threshold must be a finite number in [0, 1], got {0}")]
pub struct InvalidThreshold(pub f64);

/// Response contract for one scored lead
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub probability: f64,
    pub label: u8,
}

impl PredictionResult {
    /// `label` is 1 exactly when `probability >= threshold`
    pub fn from_probability(probability: f64, threshold: DecisionThreshold) -> Self {
        Self {
            probability,
            label: u8::from(probability >= threshold.value()),
        }
    }
}

/// Failure of the scoring pipeline for one record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Validate, encode and score one raw record
pub fn score(
    schema: &FeatureSchema,
    model: &dyn Classifier,
    threshold: DecisionThreshold,
    record: &Map<String, Value>,
) -> Result<PredictionResult, PredictError> {
    let lead = schema.validate(record)?;
    let features = encode(&lead);
    let probability = model.infer(&features)?;
    Ok(PredictionResult::from_probability(probability, threshold))
}

/// Score a batch all-or-nothing
///
/// Every record is validated before any inference runs; the first schema
/// violation is returned with its position.
pub fn score_batch(
    schema: &FeatureSchema,
    model: &dyn Classifier,
    threshold: DecisionThreshold,
    records: &[Map<String, Value>],
) -> Result<Vec<PredictionResult>, (Option<usize>, PredictError)> {
    let leads = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            schema
                .validate(record)
                .map_err(|e| (Some(index), PredictError::Schema(e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    leads
        .iter()
        .map(|lead| {
            let probability = model
                .infer(&encode(lead))
                .map_err(|e| (None, PredictError::Inference(e)))?;
            Ok(PredictionResult::from_probability(probability, threshold))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::FeatureVector;
    use crate::schema::LEAD_SCHEMA;
    use serde_json::json;

    /// Returns the website-visit column scaled into [0, 1]
    struct VisitsModel;

    impl Classifier for VisitsModel {
        fn feature_count(&self) -> usize {
            16
        }

        fn infer(&self, features: &FeatureVector) -> Result<f64, InferenceError> {
            Ok((features.as_slice()[1] / 10.0).min(1.0))
        }
    }

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(DecisionThreshold::new(0.0).is_ok());
        assert!(DecisionThreshold::new(1.0).is_ok());
        assert!(DecisionThreshold::new(-0.1).is_err());
        assert!(DecisionThreshold::new(1.5).is_err());
        assert!(DecisionThreshold::new(f64::NAN).is_err());
        assert_eq!(DecisionThreshold::default().value(), 0.5);
    }

    #[test]
    fn test_threshold_deserialize_validates() {
        let ok: DecisionThreshold = serde_json::from_str("0.7").unwrap();
        assert_eq!(ok.value(), 0.7);
        assert!(serde_json::from_str::<DecisionThreshold>("2.0").is_err());
    }

    #[test]
    fn test_label_at_threshold_is_positive() {
        let threshold = DecisionThreshold::new(0.5).unwrap();
        assert_eq!(PredictionResult::from_probability(0.5, threshold).label, 1);
        assert_eq!(PredictionResult::from_probability(0.4999, threshold).label, 0);
    }

    #[test]
    fn test_score_scenario_record() {
        let raw = record(json!({
            "first_interaction": "Website",
            "profile_completed": "High",
            "time_spent": 120,
            "website_visits": 5
        }));
        let result = score(&LEAD_SCHEMA, &VisitsModel, DecisionThreshold::DEFAULT, &raw).unwrap();
        assert_eq!(result.probability, 0.5);
        assert_eq!(result.label, 1);
    }

    #[test]
    fn test_score_reports_schema_error() {
        let raw = record(json!({
            "profile_completed": "High",
            "time_spent": 120,
            "website_visits": 5
        }));
        match score(&LEAD_SCHEMA, &VisitsModel, DecisionThreshold::DEFAULT, &raw) {
            Err(PredictError::Schema(e)) => assert_eq!(e.field, "first_interaction"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_score_batch_is_all_or_nothing() {
        let good = record(json!({
            "first_interaction": "Website",
            "profile_completed": "Low",
            "time_spent": 10,
            "website_visits": 2
        }));
        let bad = record(json!({
            "first_interaction": "Fax",
            "profile_completed": "Low",
            "time_spent": 10,
            "website_visits": 2
        }));

        let results = score_batch(
            &LEAD_SCHEMA,
            &VisitsModel,
            DecisionThreshold::DEFAULT,
            &[good.clone(), good.clone()],
        )
        .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].label, 0);

        let (index, err) = score_batch(
            &LEAD_SCHEMA,
            &VisitsModel,
            DecisionThreshold::DEFAULT,
            &[good, bad],
        )
        .unwrap_err();
        assert_eq!(index, Some(1));
        assert!(matches!(err, PredictError::Schema(ref e) if e.field == "first_interaction"));
    }
}
