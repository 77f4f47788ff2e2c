//! Ingestion of one reading plus its sky-camera image.
//!
//! The image is stored first to obtain its public URL, then the reading and
//! its image link are written in one transaction. Only after that commit is
//! the image-sequence gate evaluated; a forecast failure is logged and never
//! undoes or fails the ingestion.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    forecast::{gate, sequence},
    models::NewReading,
    AppState,
};

// ---

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Image file is required.")]
    MissingImage,

    #[error("failed to store image: {0}")]
    ImageStore(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// An uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Outcome of a committed ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub weather_data_id: i64,
    pub image_url: String,
    /// `None` when the day did not yet hold enough readings.
    pub forecast_succeeded: Option<bool>,
}

/// Object storage for uploaded images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist `bytes` and return the public URL they are reachable at.
    async fn save(&self, image: &UploadedImage) -> Result<String, std::io::Error>;

    /// Delete an image previously returned by [`ImageStore::save`].
    async fn remove(&self, url: &str) -> Result<(), std::io::Error>;
}

/// Writes images into a local directory served under `base_url`.
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    dir: PathBuf,
    base_url: String,
}

impl LocalImageStore {
    pub fn new(dir: PathBuf, base_url: &str) -> Self {
        Self {
            dir,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Unique object name keeping the upload's extension (default `jpg`).
fn object_name(original: Option<&str>) -> String {
    // ---
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "jpg".to_string());
    format!("{}.{}", Uuid::new_v4(), ext)
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, image: &UploadedImage) -> Result<String, std::io::Error> {
        // ---
        let name = object_name(image.file_name.as_deref());
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&name), &image.bytes).await?;
        debug!("Stored image {} ({} bytes)", name, image.bytes.len());
        Ok(format!("{}/{}", self.base_url, name))
    }

    async fn remove(&self, url: &str) -> Result<(), std::io::Error> {
        // ---
        let name = url
            .strip_prefix(&self.base_url)
            .map(|rest| rest.trim_start_matches('/'))
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{url} is not served by this image store"),
                )
            })?;
        tokio::fs::remove_file(self.dir.join(name)).await?;
        debug!("Removed image {}", name);
        Ok(())
    }
}

/// Store the image, write the reading atomically, then run the forecast gate.
pub async fn ingest(
    state: &AppState,
    reading: NewReading,
    image: Option<UploadedImage>,
) -> Result<Ingested, IngestError> {
    // ---
    let image = image
        .filter(|img| !img.bytes.is_empty())
        .ok_or(IngestError::MissingImage)?;
    let image_url = state.images.save(&image).await?;

    let weather_data_id = match state
        .store
        .insert_reading_with_image(&reading, &image_url)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            // Nothing references the image once the transaction rolled back
            if let Err(rm) = state.images.remove(&image_url).await {
                warn!("Could not remove orphaned image {}: {}", image_url, rm);
            }
            return Err(e.into());
        }
    };
    info!(
        "Stored weather_data_id {} at {}",
        weather_data_id, reading.timestamp
    );

    let forecast_succeeded = trigger_forecast(state, weather_data_id, &reading).await;

    Ok(Ingested {
        weather_data_id,
        image_url,
        forecast_succeeded,
    })
}

/// Post-commit, advisory step. Never returns an error.
async fn trigger_forecast(
    state: &AppState,
    weather_data_id: i64,
    reading: &NewReading,
) -> Option<bool> {
    // ---
    let ready = match gate::day_is_ready(
        state.store.as_ref(),
        reading.timestamp,
        state.config.local_offset,
    )
    .await
    {
        Ok(ready) => ready,
        Err(e) => {
            warn!("Could not count readings for forecast gate: {}", e);
            return Some(false);
        }
    };

    if !ready {
        info!(
            "Not enough data points for the local day of {}. Forecast skipped.",
            reading.timestamp
        );
        return None;
    }

    let ok = sequence::run(state, weather_data_id).await;
    if !ok {
        warn!(
            "Forecast processing failed for weather_data_id: {}",
            weather_data_id
        );
    }
    Some(ok)
}

#[cfg(test)]
pub(crate) mod testing {
    // ---
    use std::sync::Mutex;

    use super::*;

    /// Keeps uploads in memory and hands out `http://frames.test/upload-<n>.png`.
    #[derive(Default)]
    pub struct MemoryImageStore {
        pub saved: Mutex<Vec<UploadedImage>>,
        pub removed: Mutex<Vec<String>>,
    }

    impl MemoryImageStore {
        pub fn removed(&self) -> Vec<String> {
            self.removed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageStore for MemoryImageStore {
        async fn save(&self, image: &UploadedImage) -> Result<String, std::io::Error> {
            // ---
            let mut saved = self.saved.lock().unwrap();
            saved.push(image.clone());
            Ok(format!("http://frames.test/upload-{}.png", saved.len()))
        }

        async fn remove(&self, url: &str) -> Result<(), std::io::Error> {
            // ---
            self.removed.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::frames::testing::png_bytes;
    use crate::models::sample_reading;
    use crate::state::testing::harness;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn upload(h: &crate::state::testing::Harness, n: usize) -> UploadedImage {
        // ---
        // MemoryImageStore numbers uploads from 1; serve the frame it will name
        let bytes = png_bytes(3, 3, [20, 40, 60]);
        h.fetcher
            .insert(&format!("http://frames.test/upload-{n}.png"), bytes.clone());
        UploadedImage {
            file_name: Some("sky.png".to_string()),
            bytes,
        }
    }

    fn local_midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_object_name_keeps_extension() {
        // ---
        assert!(object_name(Some("frame.PNG")).ends_with(".png"));
        assert!(object_name(Some("no_extension")).ends_with(".jpg"));
        assert!(object_name(None).ends_with(".jpg"));
        assert!(object_name(Some("weird.p/ng")).ends_with(".jpg"));
        assert_ne!(object_name(None), object_name(None));
    }

    #[tokio::test]
    async fn test_local_image_store_writes_file() {
        // ---
        let dir = std::env::temp_dir().join(format!("skycast-test-{}", Uuid::new_v4()));
        let store = LocalImageStore::new(dir.clone(), "http://cdn.test/images/");
        let image = UploadedImage {
            file_name: Some("a.png".to_string()),
            bytes: vec![1, 2, 3],
        };

        let url = store.save(&image).await.unwrap();
        assert!(url.starts_with("http://cdn.test/images/"));
        let name = url.rsplit('/').next().unwrap();
        assert_eq!(std::fs::read(dir.join(name)).unwrap(), vec![1, 2, 3]);

        store.remove(&url).await.unwrap();
        assert!(!dir.join(name).exists());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_local_image_store_refuses_foreign_urls() {
        // ---
        let store = LocalImageStore::new(std::env::temp_dir(), "http://cdn.test/images");
        let err = store
            .remove("http://elsewhere.test/images/a.png")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert!(store.remove("http://cdn.test/images/../a.png").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_image_is_rejected_before_any_write() {
        // ---
        let h = harness(0.5);
        let err = ingest(&h.state, sample_reading(local_midnight()), None)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::MissingImage));
        assert_eq!(h.store.reading_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_image_link_leaves_no_reading() {
        // ---
        let h = harness(0.5);
        h.store.fail_image_link.store(true, Ordering::SeqCst);

        let err = ingest(&h.state, sample_reading(local_midnight()), Some(upload(&h, 1)))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Database(_)));
        assert_eq!(h.store.reading_count(), 0);
        assert!(h.state.store.latest_readings(1).await.unwrap().is_empty());
        // The stored image is cleaned up with the rolled-back reading
        assert_eq!(h.images.removed(), vec!["http://frames.test/upload-1.png"]);
    }

    #[tokio::test]
    async fn test_fifth_ingestion_of_the_day_triggers_forecast() {
        // ---
        let h = harness(0.25);
        let mut last = None;

        for i in 0..5 {
            let ts = local_midnight() + Duration::minutes(5 * i as i64);
            let ingested = ingest(&h.state, sample_reading(ts), Some(upload(&h, i + 1)))
                .await
                .unwrap();

            if i < 4 {
                assert_eq!(ingested.forecast_succeeded, None);
            }
            last = Some((ingested, ts));
        }

        let (ingested, ts) = last.unwrap();
        assert_eq!(ingested.forecast_succeeded, Some(true));

        let rows = h.store.sequence_forecasts();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].weather_data_id, ingested.weather_data_id);
        assert_eq!(rows[0].forecast_time, ts + Duration::minutes(5));
    }

    #[tokio::test]
    async fn test_forecast_failure_does_not_fail_ingestion() {
        // ---
        let h = harness(0.25);
        for i in 0..4 {
            let ts = local_midnight() + Duration::minutes(5 * i as i64);
            ingest(&h.state, sample_reading(ts), Some(upload(&h, i + 1)))
                .await
                .unwrap();
        }

        // Fifth frame is never served, so the forecast run fails
        let image = UploadedImage {
            file_name: None,
            bytes: png_bytes(3, 3, [1, 2, 3]),
        };
        let ingested = ingest(
            &h.state,
            sample_reading(local_midnight() + Duration::minutes(20)),
            Some(image),
        )
        .await
        .unwrap();

        assert_eq!(ingested.forecast_succeeded, Some(false));
        assert_eq!(h.store.reading_count(), 5);
        assert!(h.store.sequence_forecasts().is_empty());
    }
}
