//! Model handles and the inference seam.
//!
//! Pretrained models are consumed as opaque ONNX artifacts run through
//! `tract`. Pipelines only see [`LuxModel`] and [`ModelLoader`], so the
//! runtime can be swapped (and stubbed in tests) without touching the
//! orchestration code.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use tract_onnx::prelude::*;

use crate::{scaler::Scaler, Config};

pub use tract_onnx::prelude::tract_ndarray::{ArrayD, IxDyn};

// ---

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("failed to load model {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("inference failed: {0}")]
    Run(String),

    #[error("model produced an empty output")]
    EmptyOutput,

    #[error("invalid input shape {shape:?}: {reason}")]
    Shape { shape: Vec<usize>, reason: String },
}

/// A loaded, read-only predictive model.
pub trait LuxModel: Send + Sync {
    fn predict(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>, InferenceError>;
}

/// Loads a [`LuxModel`] from an artifact path.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn LuxModel>, InferenceError>;
}

/// ONNX model executed by tract.
pub struct OnnxModel {
    plan: TypedRunnableModel<TypedModel>,
}

impl LuxModel for OnnxModel {
    fn predict(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>, InferenceError> {
        // ---
        let outputs = self
            .plan
            .run(tvec!(Tensor::from(input).into()))
            .map_err(|e| InferenceError::Run(e.to_string()))?;
        let first = outputs.first().ok_or(InferenceError::EmptyOutput)?;
        let view = first
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Run(e.to_string()))?;
        Ok(view.to_owned())
    }
}

/// Loads ONNX artifacts from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxLoader;

impl ModelLoader for OnnxLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn LuxModel>, InferenceError> {
        // ---
        let load_err = |e: TractError| InferenceError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(load_err)?;

        tracing::debug!("Loaded ONNX model from {}", path.display());
        Ok(Arc::new(OnnxModel { plan }))
    }
}

/// Process-wide, read-only forecasting resources.
///
/// Constructed once in `main` and shared through the application state. The
/// image-sequence model and the scaler are held for the process lifetime;
/// the tabular model is re-read from `tabular_path` on every run.
pub struct ForecastModels {
    // ---
    loader: Arc<dyn ModelLoader>,
    tabular_path: PathBuf,
    sequence: Option<Arc<dyn LuxModel>>,
    scaler: Option<Arc<Scaler>>,
}

impl ForecastModels {
    // ---
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        tabular_path: PathBuf,
        sequence: Option<Arc<dyn LuxModel>>,
        scaler: Option<Arc<Scaler>>,
    ) -> Self {
        // ---
        ForecastModels {
            loader,
            tabular_path,
            sequence,
            scaler,
        }
    }

    /// Load the image-sequence model and the scaler once at startup.
    ///
    /// A missing or broken artifact is logged and left unloaded; the service
    /// still starts and the affected pipelines report not-ready.
    pub fn init(cfg: &Config, loader: Arc<dyn ModelLoader>) -> Self {
        // ---
        let sequence = match loader.load(&cfg.cnn_model_path) {
            Ok(model) => {
                tracing::info!("Image-sequence model loaded");
                Some(model)
            }
            Err(e) => {
                tracing::warn!("Image-sequence model not loaded: {}", e);
                None
            }
        };

        let scaler = match Scaler::from_path(&cfg.scaler_path) {
            Ok(scaler) => {
                tracing::info!("Scaler loaded ({} feature(s))", scaler.feature_count());
                Some(Arc::new(scaler))
            }
            Err(e) => {
                tracing::warn!("Scaler not loaded: {}", e);
                None
            }
        };

        Self::new(loader, cfg.lstm_model_path.clone(), sequence, scaler)
    }

    pub fn sequence_model(&self) -> Option<Arc<dyn LuxModel>> {
        self.sequence.clone()
    }

    pub fn scaler(&self) -> Option<Arc<Scaler>> {
        self.scaler.clone()
    }

    /// Load the tabular model from disk on the blocking pool. Not cached
    /// between calls.
    pub async fn load_tabular(&self) -> Result<Arc<dyn LuxModel>, InferenceError> {
        // ---
        let loader = self.loader.clone();
        let path = self.tabular_path.clone();
        tokio::task::spawn_blocking(move || loader.load(&path))
            .await
            .map_err(|e| InferenceError::Load {
                path: self.tabular_path.display().to_string(),
                reason: format!("model load task failed: {e}"),
            })?
    }
}

/// Run a prediction on the blocking pool and wait for it.
pub async fn predict(
    model: Arc<dyn LuxModel>,
    input: ArrayD<f32>,
) -> Result<ArrayD<f32>, InferenceError> {
    // ---
    tokio::task::spawn_blocking(move || model.predict(input))
        .await
        .map_err(|e| InferenceError::Run(format!("inference task failed: {e}")))?
}

/// First element of a model output in row-major order (`output[0][0]` for a
/// `[batch, horizons]` tensor).
pub fn first_value(output: &ArrayD<f32>) -> Result<f32, InferenceError> {
    output.iter().next().copied().ok_or(InferenceError::EmptyOutput)
}
