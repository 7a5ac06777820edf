//! Record → feature vector encoding
//!
//! Encoding is a pure function of a [`ValidatedLead`]: numeric fields go
//! through their training-time [`Scaling`](crate::schema::Scaling), categorical
//! fields expand into one-hot columns for every non-reference category. The
//! output order is exactly [`FeatureSchema::feature_names`].

use serde::{Deserialize, Serialize};

use crate::schema::{FeatureSchema, FieldKind, FieldValue, ValidatedLead};

/// Ordered numeric input for the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Encode a validated record into the model's feature vector
pub fn encode(lead: &ValidatedLead<'_>) -> FeatureVector {
    let schema: &FeatureSchema = lead.schema();
    let mut values = Vec::with_capacity(schema.feature_count());

    for (field, value) in schema.fields().iter().zip(lead.values()) {
        match (field.kind, *value) {
            (FieldKind::Numeric { scaling, .. }, FieldValue::Number(v)) => {
                values.push(scaling.apply(v));
            }
            (FieldKind::Categorical { categories }, FieldValue::Category(selected)) => {
                values.extend(
                    categories
                        .iter()
                        .enumerate()
                        .filter(|(_, c)| c.column.is_some())
                        .map(|(i, _)| if i == selected { 1.0 } else { 0.0 }),
                );
            }
            _ => unreachable!("field '{}' holds a value of the wrong kind", field.name),
        }
    }

    FeatureVector(values)
}
