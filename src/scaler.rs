//! Linear feature scaler shared by both forecast pipelines.
//!
//! Parameters are fitted offline alongside the models and shipped as a small
//! JSON file. At inference time only [`Scaler::inverse_scale`] is used, to map
//! a model output back to lux; model inputs are fed unscaled.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

// ---

#[derive(Debug, Error, PartialEq)]
pub enum ScalerError {
    #[error("expected {expected} features, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("invalid scaler parameters: {0}")]
    InvalidParams(String),

    #[error("failed to read scaler parameters from {path}: {reason}")]
    Load { path: String, reason: String },
}

/// Per-feature parameters, as stored on disk.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerParams {
    /// Maps `[min, max]` onto `[0, 1]`.
    MinMax { min: Vec<f64>, max: Vec<f64> },
    /// Maps to zero mean and unit variance.
    Standard { mean: Vec<f64>, std: Vec<f64> },
}

/// Immutable scaler built from validated [`ScalerParams`].
#[derive(Debug, Clone)]
pub struct Scaler {
    // ---
    /// Offset subtracted on the forward transform.
    offset: Vec<f64>,
    /// Divisor applied on the forward transform.
    scale: Vec<f64>,
}

impl Scaler {
    // ---
    pub fn new(params: ScalerParams) -> Result<Self, ScalerError> {
        // ---
        let (offset, scale) = match params {
            ScalerParams::MinMax { min, max } => {
                if min.len() != max.len() {
                    return Err(ScalerError::InvalidParams(format!(
                        "min has {} entries but max has {}",
                        min.len(),
                        max.len()
                    )));
                }
                let range = min.iter().zip(&max).map(|(lo, hi)| hi - lo).collect();
                (min, range)
            }
            ScalerParams::Standard { mean, std } => {
                if mean.len() != std.len() {
                    return Err(ScalerError::InvalidParams(format!(
                        "mean has {} entries but std has {}",
                        mean.len(),
                        std.len()
                    )));
                }
                (mean, std)
            }
        };

        if offset.is_empty() {
            return Err(ScalerError::InvalidParams("no features".to_string()));
        }
        if let Some(i) = scale.iter().position(|s| *s == 0.0 || !s.is_finite()) {
            return Err(ScalerError::InvalidParams(format!(
                "feature {i} has a zero or non-finite scale"
            )));
        }

        Ok(Scaler { offset, scale })
    }

    /// Load and validate parameters from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ScalerError> {
        // ---
        let load_err = |reason: String| ScalerError::Load {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let params: ScalerParams =
            serde_json::from_str(&raw).map_err(|e| load_err(e.to_string()))?;
        Self::new(params)
    }

    pub fn feature_count(&self) -> usize {
        self.offset.len()
    }

    pub fn scale(&self, features: &[f64]) -> Result<Vec<f64>, ScalerError> {
        // ---
        self.check_len(features)?;
        Ok(features
            .iter()
            .zip(self.offset.iter().zip(&self.scale))
            .map(|(x, (offset, scale))| (x - offset) / scale)
            .collect())
    }

    pub fn inverse_scale(&self, features: &[f64]) -> Result<Vec<f64>, ScalerError> {
        // ---
        self.check_len(features)?;
        Ok(features
            .iter()
            .zip(self.offset.iter().zip(&self.scale))
            .map(|(x, (offset, scale))| x * scale + offset)
            .collect())
    }

    /// Inverse-scale a single model output. Requires a one-feature scaler.
    pub fn inverse_scale_one(&self, value: f64) -> Result<f64, ScalerError> {
        // ---
        Ok(self.inverse_scale(&[value])?[0])
    }

    fn check_len(&self, features: &[f64]) -> Result<(), ScalerError> {
        // ---
        if features.len() != self.offset.len() {
            return Err(ScalerError::LengthMismatch {
                expected: self.offset.len(),
                actual: features.len(),
            });
        }
        Ok(())
    }
}
