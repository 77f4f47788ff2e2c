//! Serves images written by the local image store so that the URLs handed out
//! at ingestion resolve when no external object store fronts `IMAGE_DIR`.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use super::error_response;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/images/{name}", get(image))
}

/// Only flat `<stem>.<ext>` names produced by the image store are served.
fn is_safe_name(name: &str) -> bool {
    // ---
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !name.contains("..")
}

fn content_type(name: &str) -> &'static str {
    // ---
    match name.rsplit('.').next().map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

async fn image(Path(name): Path<String>, State(state): State<AppState>) -> Response {
    // ---
    if !is_safe_name(&name) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid image name.");
    }

    match tokio::fs::read(state.config.image_dir.join(&name)).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(&name))], bytes).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, "Image not found.")
        }
        Err(e) => {
            tracing::error!("Error reading image {}: {}", name, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}
