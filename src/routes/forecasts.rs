use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info};

use super::{error_response, message_response};
use crate::{
    error::ForecastError,
    forecast::{sequence, tabular, TabularOutcome},
    AppState,
};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/forecast", post(run_tabular))
        .route("/forecast/latest", get(latest_tabular))
        .route("/forecast/cnn/latest", get(next_sequence))
        .route("/forecast/cnn/{id}", post(run_sequence))
}

/// Status and client-facing message for a failed tabular run.
fn tabular_failure(err: &ForecastError) -> (StatusCode, &'static str) {
    // ---
    match err {
        ForecastError::InsufficientData { .. } => {
            (StatusCode::NOT_FOUND, "Not enough weather data found")
        }
        ForecastError::ModelUnavailable(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Error loading model")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Error processing forecast"),
    }
}

/// `POST /forecast`: run the tabular pipeline once.
async fn run_tabular(State(state): State<AppState>) -> Response {
    // ---
    info!("POST /forecast - Running tabular forecast");

    match tabular::run(&state).await {
        Ok(TabularOutcome {
            forecast_id,
            five_min_lux,
        }) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Forecast processed successfully",
                "forecast_id": forecast_id,
                "five_min_lux": five_min_lux,
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Error processing tabular forecast: {}", e);
            let (status, message) = tabular_failure(&e);
            error_response(status, message)
        }
    }
}

/// `GET /forecast/latest`: most recent tabular forecast.
async fn latest_tabular(State(state): State<AppState>) -> Response {
    // ---
    match state.store.latest_tabular_forecast().await {
        Ok(Some(forecast)) => Json(forecast).into_response(),
        Ok(None) => message_response(StatusCode::NOT_FOUND, "No forecasts found."),
        Err(e) => {
            error!("Error fetching latest forecast: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// `POST /forecast/cnn/{id}`: run the image-sequence pipeline for a reading.
async fn run_sequence(Path(id): Path<i64>, State(state): State<AppState>) -> Response {
    // ---
    let success = sequence::run(&state, id).await;
    Json(json!({ "success": success })).into_response()
}

/// `GET /forecast/cnn/latest`: the next image-sequence forecast after now.
async fn next_sequence(State(state): State<AppState>) -> Response {
    // ---
    match state.store.next_sequence_forecast(Utc::now()).await {
        Ok(Some(forecast)) => Json(forecast).into_response(),
        Ok(None) => message_response(StatusCode::NOT_FOUND, "No upcoming forecasts found."),
        Err(e) => {
            error!("Error fetching the latest forecast: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}
