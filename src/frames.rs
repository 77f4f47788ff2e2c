//! Sky-camera frame retrieval and preprocessing for the image-sequence model.
//!
//! Frames are fetched one at a time over HTTP, decoded to RGB, resized to
//! [`FRAME_SIZE`]² and scaled to `[0, 1]`. The per-frame buffers are then
//! stacked into a `[1, n, H, W, 3]` batch.

use async_trait::async_trait;
use image::imageops::FilterType;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error};

use crate::inference::{ArrayD, InferenceError, IxDyn};

// ---

/// Side length, in pixels, of the square frames the CNN was trained on.
pub const FRAME_SIZE: u32 = 299;

const CHANNELS: usize = 3;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error with status code: {0}")]
    Http(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Image decode error: {0}")]
    Decode(String),
}

/// Source of raw image bytes for a stored image URL.
#[async_trait]
pub trait FrameFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches frames with a reusable HTTP client.
#[derive(Debug, Clone, Default)]
pub struct HttpFrameFetcher {
    client: Client,
}

impl HttpFrameFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl FrameFetcher for HttpFrameFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        // ---
        debug!("Fetching frame from: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            error!("Network error fetching frame {}: {}", url, e);
            FetchError::Network(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(
                "HTTP error {} fetching frame {}: {}",
                status.as_u16(),
                url,
                status.canonical_reason().unwrap_or("Unknown")
            );
            return Err(FetchError::Http(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Decode an encoded image into a normalized `FRAME_SIZE x FRAME_SIZE x 3`
/// buffer in row-major HWC order.
pub fn decode_frame(bytes: &[u8]) -> Result<Vec<f32>, FetchError> {
    // ---
    let img = image::load_from_memory(bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, FRAME_SIZE, FRAME_SIZE, FilterType::Triangle);

    Ok(resized
        .into_raw()
        .into_iter()
        .map(|v| f32::from(v) / 255.0)
        .collect())
}

/// Stack decoded frames into a single-batch sequence tensor of shape
/// `[1, frames.len(), FRAME_SIZE, FRAME_SIZE, 3]`. Order is preserved.
pub fn stack_frames(frames: Vec<Vec<f32>>) -> Result<ArrayD<f32>, InferenceError> {
    // ---
    let side = FRAME_SIZE as usize;
    let shape = vec![1, frames.len(), side, side, CHANNELS];
    let frame_len = side * side * CHANNELS;

    if frames.is_empty() {
        return Err(InferenceError::Shape {
            shape,
            reason: "sequence has no frames".to_string(),
        });
    }
    if let Some(bad) = frames.iter().position(|f| f.len() != frame_len) {
        return Err(InferenceError::Shape {
            shape,
            reason: format!("frame {bad} does not have {frame_len} values"),
        });
    }

    let data: Vec<f32> = frames.into_iter().flatten().collect();
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| InferenceError::Shape {
        shape,
        reason: e.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    // ---
    use std::{collections::HashMap, io::Cursor, sync::Mutex};

    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    /// PNG of the given size filled with one color.
    pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        // ---
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Serves frames from memory; unknown URLs answer 404.
    #[derive(Default)]
    pub struct MemoryFetcher {
        pub frames: Mutex<HashMap<String, Vec<u8>>>,
        pub requested: Mutex<Vec<String>>,
    }

    impl MemoryFetcher {
        pub fn insert(&self, url: &str, bytes: Vec<u8>) {
            self.frames.lock().unwrap().insert(url.to_string(), bytes);
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FrameFetcher for MemoryFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            // ---
            self.requested.lock().unwrap().push(url.to_string());
            self.frames
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or(FetchError::Http(404))
        }
    }
}
