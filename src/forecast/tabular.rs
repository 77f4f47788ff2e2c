//! Tabular (LSTM) forecast over the most recent numeric readings.
//!
//! The model sees a `[5, 8]` matrix of raw, unscaled features, one row per
//! reading, newest first. Only the 5-minute horizon is produced.

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, info};

use crate::{
    error::ForecastError,
    forecast::gate::MIN_READINGS,
    inference::{self, ArrayD, InferenceError, IxDyn},
    models::Reading,
    AppState,
};

// ---

/// Features per reading fed to the tabular model.
pub const FEATURES: usize = 8;

/// Result of a successful tabular run.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularOutcome {
    pub forecast_id: i64,
    pub five_min_lux: f64,
}

/// UTC time of day as the number `HHMM` (00:05 is 5, 13:45 is 1345).
///
/// Not cyclic: 23:55 and 00:00 are 2355 apart.
pub fn time_of_day_code(ts: DateTime<Utc>) -> f32 {
    (ts.hour() * 100 + ts.minute()) as f32
}

fn feature(value: Option<f64>) -> f32 {
    value.map_or(f32::NAN, |v| v as f32)
}

/// temperature_c, humidity, pressure, wind_speed, wind_direction,
/// pressure (again), ambient UV, HHMM.
pub fn feature_row(reading: &Reading) -> [f32; FEATURES] {
    // ---
    [
        feature(reading.temperature_c),
        feature(reading.humidity),
        feature(reading.pressure),
        feature(reading.wind_speed),
        feature(reading.wind_direction),
        feature(reading.pressure),
        feature(reading.ambient_uv),
        time_of_day_code(reading.timestamp),
    ]
}

/// Stack feature rows in the given order into an `[n, FEATURES]` tensor.
pub fn feature_matrix(readings: &[Reading]) -> Result<ArrayD<f32>, InferenceError> {
    // ---
    let shape = vec![readings.len(), FEATURES];
    let data: Vec<f32> = readings.iter().flat_map(feature_row).collect();
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| InferenceError::Shape {
        shape,
        reason: e.to_string(),
    })
}

/// Run the tabular pipeline end to end and persist one forecast row.
///
/// Nothing is written unless every step before the insert succeeds.
pub async fn run(state: &AppState) -> Result<TabularOutcome, ForecastError> {
    // ---
    let readings = state.store.latest_readings(MIN_READINGS as i64).await?;
    if readings.len() < MIN_READINGS {
        return Err(ForecastError::InsufficientData {
            required: MIN_READINGS,
            found: readings.len(),
        });
    }

    let input = feature_matrix(&readings)?;
    debug!("Tabular input shape {:?}", input.shape());

    let model = state.models.load_tabular().await.map_err(|e| {
        tracing::error!("Error loading tabular model: {}", e);
        ForecastError::ModelUnavailable(e.to_string())
    })?;
    let scaler = state.models.scaler().ok_or(ForecastError::ScalerUnavailable)?;

    let output = inference::predict(model, input).await?;
    let scaled = inference::first_value(&output)?;
    let five_min_lux = scaler.inverse_scale_one(f64::from(scaled))?;

    let forecast_id = state
        .store
        .insert_tabular_forecast(Utc::now(), five_min_lux)
        .await?;

    info!(
        "Tabular forecast {} stored: 5 min = {:.1} lux",
        forecast_id, five_min_lux
    );
    Ok(TabularOutcome {
        forecast_id,
        five_min_lux,
    })
}
