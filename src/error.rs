use thiserror::Error;

use crate::{frames::FetchError, inference::InferenceError, scaler::ScalerError};

/// Failures of either forecast pipeline.
///
/// Grouped as not-ready (retry later), not-found (abort this run only),
/// upstream fetch (abort the batch) and database (transaction rolled back).
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("insufficient data: need {required} readings, found {found}")]
    InsufficientData { required: usize, found: usize },

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("scaler is not loaded")]
    ScalerUnavailable,

    #[error("no weather data found for id {0}")]
    ReadingNotFound(i64),

    #[error("no image URL for weather data id {0}")]
    ImageMissing(i64),

    #[error("frame for weather data id {id} unusable: {source}")]
    Fetch {
        id: i64,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Scaler(#[from] ScalerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ForecastError {
    /// True for conditions a caller may simply retry later.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            ForecastError::InsufficientData { .. }
                | ForecastError::ModelUnavailable(_)
                | ForecastError::ScalerUnavailable
        )
    }
}
