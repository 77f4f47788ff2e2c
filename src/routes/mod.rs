use axum::{http::StatusCode, response::IntoResponse, response::Response, Json, Router};
use serde_json::json;

use crate::AppState;

mod forecasts;
mod health;
mod images;
mod weather;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(weather::router())
        .merge(forecasts::router())
        .merge(images::router())
        .merge(health::router())
        .with_state(state)
}

/// `{"error": message}` with the given status.
fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// `{"message": message}` with the given status.
fn message_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}
