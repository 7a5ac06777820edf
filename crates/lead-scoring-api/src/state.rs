//! Service health state and the write-once model slot
//!
//! The model is published through a [`OnceLock`] and the health state is an
//! atomic written with `Release` after the slot is filled. Any reader that
//! loads `Ready` with `Acquire` therefore sees the installed model.

use lead_scoring_core::{encode, Classifier, FeatureSchema, InferenceError, ModelInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Largest drift of the canary probability tolerated between checks
pub const LIVENESS_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum HealthState {
    Starting = 0,
    Ready = 1,
    Unhealthy = 2,
}

impl HealthState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HealthState::Starting,
            1 => HealthState::Ready,
            _ => HealthState::Unhealthy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Starting => "starting",
            HealthState::Ready => "ready",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model that passed loading, plus the canary score taken right after
pub struct LoadedModel {
    pub classifier: Arc<dyn Classifier>,
    pub info: ModelInfo,
    canary: f64,
}

impl LoadedModel {
    /// Score the schema's reference record once to establish the canary
    pub fn new(
        classifier: Arc<dyn Classifier>,
        info: ModelInfo,
        schema: &FeatureSchema,
    ) -> Result<Self, InferenceError> {
        let canary = classifier.infer(&encode(&schema.reference_record()))?;
        if !canary.is_finite() {
            return Err(InferenceError::NonFiniteOutput);
        }
        Ok(Self {
            classifier,
            info,
            canary,
        })
    }

    pub fn canary(&self) -> f64 {
        self.canary
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("info", &self.info)
            .field("canary", &self.canary)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LivenessFailure {
    #[error("No model installed")]
    NotLoaded,

    #[error("Canary inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Canary score diverged: expected {expected}, got {actual}")]
    Diverged { expected: f64, actual: f64 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("A model is already installed")]
pub struct AlreadyInstalled;

/// Health state machine: starting → ready → unhealthy
#[derive(Debug)]
pub struct ServiceHealth {
    state: AtomicU8,
    model: OnceLock<LoadedModel>,
}

impl ServiceHealth {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(HealthState::Starting as u8),
            model: OnceLock::new(),
        }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Publish the model and move to `ready`
    ///
    /// An instance already marked unhealthy keeps the model but stays unhealthy.
    pub fn install(&self, model: LoadedModel) -> Result<HealthState, AlreadyInstalled> {
        self.model.set(model).map_err(|_| AlreadyInstalled)?;

        match self.state.compare_exchange(
            HealthState::Starting as u8,
            HealthState::Ready as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(HealthState::Ready),
            Err(current) => Ok(HealthState::from_u8(current)),
        }
    }

    /// Terminal transition; returns `true` the first time
    pub fn mark_unhealthy(&self) -> bool {
        let previous = self
            .state
            .swap(HealthState::Unhealthy as u8, Ordering::AcqRel);
        previous != HealthState::Unhealthy as u8
    }

    /// The model, only while the instance is ready
    pub fn ready_model(&self) -> Option<&LoadedModel> {
        match self.state() {
            HealthState::Ready => self.model.get(),
            _ => None,
        }
    }

    /// The installed model regardless of health, for reporting
    pub fn model(&self) -> Option<&LoadedModel> {
        self.model.get()
    }

    /// Re-score the reference record and compare against the canary
    pub fn check_liveness(&self, schema: &FeatureSchema) -> Result<(), LivenessFailure> {
        let model = self.model.get().ok_or(LivenessFailure::NotLoaded)?;
        let actual = model
            .classifier
            .infer(&encode(&schema.reference_record()))?;
        if !actual.is_finite() || (actual - model.canary).abs() > LIVENESS_TOLERANCE {
            return Err(LivenessFailure::Diverged {
                expected: model.canary,
                actual,
            });
        }
        Ok(())
    }
}

impl Default for ServiceHealth {
    fn default() -> Self {
        Self::new()
    }
}
