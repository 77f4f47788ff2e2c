//! End-to-end checks against a running service.
//!
//! These need the binary up at `BASE_URL` (default `http://localhost:8080`)
//! with a fresh database, so they are ignored by default:
//! `cargo test -- --ignored`.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Reading {
    id: i64,
    timestamp: DateTime<Utc>,
    temperature_c: Option<f64>,
    image_url: Option<String>,
}

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into())
}

/// Minimal 1x1 PNG.
const PIXEL_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53,
    0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00,
    0x00, 0x03, 0x01, 0x01, 0x00, 0x18, 0xDD, 0x8D, 0xB0, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E,
    0x44, 0xAE, 0x42, 0x60, 0x82,
];

async fn ingest(client: &Client, timestamp: DateTime<Utc>) -> Result<i64> {
    // ---
    let form = multipart::Form::new()
        .text("timestamp", timestamp.to_rfc3339())
        .text("temperature_c", "21.5")
        .text("humidity", "48")
        .text("pressure", "1013.2")
        .text("wind_speed", "3.2")
        .text("wind_direction", "180")
        .text("ambient_uv", "2")
        .part(
            "image",
            multipart::Part::bytes(PIXEL_PNG.to_vec())
                .file_name("sky.png")
                .mime_str("image/png")?,
        );

    let resp = client
        .post(format!("{}/weather", base_url()))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = resp.json().await?;
    Ok(body["weather_data_id"]
        .as_i64()
        .expect("weather_data_id in response"))
}

#[tokio::test]
#[ignore = "requires a running service at BASE_URL"]
async fn health_reports_ok() -> Result<()> {
    // ---
    let body: Value = Client::new()
        .get(format!("{}/health", base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running service at BASE_URL with an empty database"]
async fn tabular_forecast_needs_five_readings() -> Result<()> {
    // ---
    let resp = Client::new()
        .post(format!("{}/forecast", base_url()))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = resp.json().await?;
    assert_eq!(body["error"], "Not enough weather data found");
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running service at BASE_URL"]
async fn ingestion_without_image_is_rejected() -> Result<()> {
    // ---
    let form = multipart::Form::new().text("timestamp", Utc::now().to_rfc3339());
    let resp = Client::new()
        .post(format!("{}/weather", base_url()))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running service at BASE_URL with models loaded"]
async fn fifth_ingestion_of_a_day_produces_one_forecast() -> Result<()> {
    // ---
    let client = Client::new();
    // A far-future local day (CST midnight) so no existing rows share the window
    let start: DateTime<Utc> = "2099-06-01T06:00:00Z".parse()?;

    let mut last_id = 0;
    for i in 0..5 {
        last_id = ingest(&client, start + Duration::minutes(5 * i)).await?;
    }

    let live: Reading = client
        .get(format!("{}/weather/live", base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(live.id, last_id);
    assert_eq!(live.timestamp, start + Duration::minutes(20));
    assert_eq!(live.temperature_c, Some(21.5));
    assert!(live.image_url.is_some());

    let forecast: Value = client
        .get(format!("{}/forecast/cnn/latest", base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(forecast["weather_data_id"].as_i64(), Some(last_id));

    let forecast_time: DateTime<Utc> = serde_json::from_value(forecast["forecast_time"].clone())?;
    assert_eq!(forecast_time, start + Duration::minutes(25));

    // Re-triggering the same reading is a no-op success
    let again: Value = client
        .post(format!("{}/forecast/cnn/{}", base_url(), last_id))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(again["success"], true);

    Ok(())
}
