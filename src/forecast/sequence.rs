//! Image-sequence (CNN) forecast over the current local day's sky frames.
//!
//! Triggered after an ingestion commits. The run is all-or-nothing: every
//! reading in the day must have a fetchable, decodable frame or no forecast
//! is stored. Errors never escape [`run`]; callers only see a success flag.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::{
    error::ForecastError,
    forecast::gate,
    frames,
    inference,
    AppState,
};

// ---

#[derive(Debug, Clone, PartialEq)]
pub enum SequenceOutcome {
    /// A new forecast row was written.
    Created {
        forecast_id: i64,
        forecast_time: DateTime<Utc>,
        lux: f64,
    },
    /// A forecast for this target time already exists; nothing was done.
    AlreadyExists { forecast_time: DateTime<Utc> },
}

/// Run the pipeline for `weather_data_id`, logging any failure.
pub async fn run(state: &AppState, weather_data_id: i64) -> bool {
    // ---
    match try_run(state, weather_data_id).await {
        Ok(SequenceOutcome::Created {
            forecast_id,
            forecast_time,
            lux,
        }) => {
            info!(
                "Forecast {} stored for weather_data_id {}: {:.1} lux at {}",
                forecast_id, weather_data_id, lux, forecast_time
            );
            true
        }
        Ok(SequenceOutcome::AlreadyExists { forecast_time }) => {
            info!(
                "Forecast already exists for {}. Skipping prediction.",
                forecast_time
            );
            true
        }
        Err(e) if e.is_not_ready() => {
            warn!(
                "Image-sequence forecast not ready for weather_data_id {}: {}",
                weather_data_id, e
            );
            false
        }
        Err(e) => {
            error!(
                "Image-sequence forecast failed for weather_data_id {}: {}",
                weather_data_id, e
            );
            false
        }
    }
}

/// The pipeline proper, with typed errors.
pub async fn try_run(
    state: &AppState,
    weather_data_id: i64,
) -> Result<SequenceOutcome, ForecastError> {
    // ---
    let model = state.models.sequence_model().ok_or_else(|| {
        ForecastError::ModelUnavailable("image-sequence model is not loaded".to_string())
    })?;
    let scaler = state.models.scaler().ok_or(ForecastError::ScalerUnavailable)?;

    let current = state
        .store
        .reading_with_image(weather_data_id)
        .await?
        .ok_or(ForecastError::ReadingNotFound(weather_data_id))?;
    if current.image_url.is_none() {
        return Err(ForecastError::ImageMissing(weather_data_id));
    }

    let forecast_time = gate::target_time(current.timestamp);
    if state.store.sequence_forecast_exists(forecast_time).await? {
        return Ok(SequenceOutcome::AlreadyExists { forecast_time });
    }

    let window = gate::local_day_window(current.timestamp, state.config.local_offset);
    let day = state.store.readings_between(window.start, window.end).await?;
    debug!(
        "Building sequence from {} reading(s) between {} and {}",
        day.len(),
        window.start,
        window.end
    );

    // Sequential on purpose: frame order must follow timestamp order
    let mut sequence = Vec::with_capacity(day.len());
    for reading in &day {
        let url = reading
            .image_url
            .as_deref()
            .ok_or(ForecastError::ImageMissing(reading.id))?;
        let fetch_err = |source| ForecastError::Fetch {
            id: reading.id,
            source,
        };
        let bytes = state.fetcher.fetch(url).await.map_err(fetch_err)?;
        sequence.push(frames::decode_frame(&bytes).map_err(fetch_err)?);
    }

    let batch = frames::stack_frames(sequence)?;
    let output = inference::predict(model, batch).await?;
    let scaled = inference::first_value(&output)?;
    let lux = scaler.inverse_scale_one(f64::from(scaled))? + state.config.lux_offset;

    match state
        .store
        .insert_sequence_forecast(weather_data_id, forecast_time, lux)
        .await?
    {
        Some(forecast_id) => Ok(SequenceOutcome::Created {
            forecast_id,
            forecast_time,
            lux,
        }),
        // Lost the race to a concurrent trigger for the same target time
        None => Ok(SequenceOutcome::AlreadyExists { forecast_time }),
    }
}
