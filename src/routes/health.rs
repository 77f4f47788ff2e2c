// src/routes/health.rs
//! API health check endpoint for the skycast backend.
//!
//! This module defines the `/health` route used by container orchestrators
//! and CI pipelines to verify that the service is running and able to respond
//! to HTTP requests. It also reports whether the image-sequence model and the
//! scaler were loaded at startup, since the service deliberately starts
//! without them. Following the Explicit Module Boundary Pattern (EMBP), the
//! gateway (`mod.rs`) merges this subrouter into the top-level router.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    sequence_model_loaded: bool,
    scaler_loaded: bool,
}

/// Handle `GET /health`.
///
/// Does not touch the database or other external services.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sequence_model_loaded: state.models.sequence_model().is_some(),
        scaler_loaded: state.models.scaler().is_some(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::state::testing::{harness, unloaded_harness};

    #[tokio::test]
    async fn test_health_reports_loaded_resources() {
        // ---
        let Json(body) = health(State(harness(0.1).state)).await;
        assert_eq!(body.status, "ok");
        assert!(body.sequence_model_loaded);
        assert!(body.scaler_loaded);

        let Json(body) = health(State(unloaded_harness().state)).await;
        assert!(!body.sequence_model_loaded);
        assert!(!body.scaler_loaded);
    }
}
