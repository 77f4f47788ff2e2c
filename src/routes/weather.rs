use std::collections::HashMap;

use axum::{
    extract::{Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use super::{error_response, message_response};
use crate::{
    ingest::{self, IngestError, UploadedImage},
    models::{NewReading, Reading},
    AppState,
};

// ---

/// Column order of the CSV export; matches the field order of [`Reading`].
const CSV_HEADER: [&str; 19] = [
    "id",
    "timestamp",
    "temperature_c",
    "temperature_f",
    "humidity",
    "wind_speed",
    "wind_direction",
    "pressure",
    "ambient_battery_ok",
    "ambient_temp",
    "ambient_humidity",
    "ambient_wind_direction",
    "ambient_wind_speed",
    "ambient_wind_max_speed",
    "ambient_rain",
    "ambient_uv",
    "ambient_uvi",
    "ambient_light_lux",
    "image_url",
];

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/weather", post(ingest_handler))
        .route("/weather/live", get(live))
        .route("/weather/historical", get(historical))
        .route("/weather/export", get(export_csv))
}

/// `POST /weather`: multipart form of reading fields plus an `image` file.
async fn ingest_handler(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    // ---
    info!("POST /weather - Ingesting reading");

    let mut fields = HashMap::new();
    let mut image = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                error!("Malformed multipart body: {}", e);
                return error_response(StatusCode::BAD_REQUEST, "Malformed multipart body.");
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let file_name = field.file_name().map(String::from);
            match field.bytes().await {
                Ok(bytes) => {
                    image = Some(UploadedImage {
                        file_name,
                        bytes: bytes.to_vec(),
                    })
                }
                Err(e) => {
                    error!("Failed to read image part: {}", e);
                    return error_response(StatusCode::BAD_REQUEST, "Unreadable image part.");
                }
            }
        } else {
            match field.text().await {
                Ok(text) => {
                    fields.insert(name, text);
                }
                Err(e) => {
                    error!("Failed to read field {}: {}", name, e);
                    return error_response(StatusCode::BAD_REQUEST, "Unreadable form field.");
                }
            }
        }
    }

    if image.is_none() {
        return error_response(StatusCode::BAD_REQUEST, "Image file is required.");
    }

    let reading = match NewReading::from_fields(&fields) {
        Ok(reading) => reading,
        Err(e) => {
            debug!("Rejected reading: {}", e);
            return error_response(StatusCode::BAD_REQUEST, &e);
        }
    };

    match ingest::ingest(&state, reading, image).await {
        Ok(ingested) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Weather data and image uploaded successfully.",
                "weather_data_id": ingested.weather_data_id,
            })),
        )
            .into_response(),
        Err(IngestError::MissingImage) => {
            error_response(StatusCode::BAD_REQUEST, "Image file is required.")
        }
        Err(e) => {
            error!("Error inserting weather data and image: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server Error")
        }
    }
}

/// `GET /weather/live`: the most recent reading with its image.
async fn live(State(state): State<AppState>) -> Response {
    // ---
    match state.store.latest_readings(1).await {
        Ok(mut rows) => match rows.pop() {
            Some(reading) => Json(reading).into_response(),
            None => error_response(StatusCode::NOT_FOUND, "No data found."),
        },
        Err(e) => {
            error!("Error fetching live data: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoricalQuery {
    #[serde(rename = "startDate")]
    start_date: Option<String>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
}

/// Strict `YYYY-MM-DD`.
fn parse_day(value: &str) -> Option<NaiveDate> {
    // ---
    let bytes = value.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Validate the historical query, returning the inclusive date range.
fn parse_date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(NaiveDate, NaiveDate), &'static str> {
    // ---
    let (Some(start), Some(end)) = (start, end) else {
        return Err(
            "Both startDate and endDate query parameters are required in YYYY-MM-DD format.",
        );
    };
    let (Some(start), Some(end)) = (parse_day(start), parse_day(end)) else {
        return Err("startDate and endDate must be valid dates in YYYY-MM-DD format.");
    };
    if start > end {
        return Err("startDate cannot be after endDate.");
    }
    Ok((start, end))
}

/// `GET /weather/historical?startDate=..&endDate=..`
async fn historical(
    Query(params): Query<HistoricalQuery>,
    State(state): State<AppState>,
) -> Response {
    // ---
    let (start, end) =
        match parse_date_range(params.start_date.as_deref(), params.end_date.as_deref()) {
            Ok(range) => range,
            Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
        };

    match state.store.readings_on_dates(start, end).await {
        Ok(rows) if rows.is_empty() => message_response(
            StatusCode::NOT_FOUND,
            "No data found for the specified date range.",
        ),
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            error!("Error fetching historical data: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    start: Option<String>,
    end: Option<String>,
}

/// Render readings as CSV with a header row, even when empty.
fn readings_csv(readings: &[Reading]) -> Result<Vec<u8>, csv::Error> {
    // ---
    let mut wtr = csv::Writer::from_writer(Vec::new());
    if readings.is_empty() {
        wtr.write_record(CSV_HEADER)?;
    }
    for reading in readings {
        wtr.serialize(reading)?;
    }
    wtr.into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// `GET /weather/export?start=<RFC 3339>&end=<RFC 3339>`
async fn export_csv(Query(params): Query<ExportQuery>, State(state): State<AppState>) -> Response {
    // ---
    let parse = |v: Option<&str>| {
        v.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    };
    let (Some(start), Some(end)) = (parse(params.start.as_deref()), parse(params.end.as_deref()))
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Start and end query parameters are required in ISO format.",
        );
    };

    let rows = match state.store.readings_in_range(start, end).await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Error exporting data to CSV: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };

    match readings_csv(&rows) {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"weather-data.csv\"",
                ),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Error rendering CSV: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::sample_reading;
    use crate::state::testing::harness;
    use chrono::TimeZone;

    #[test]
    fn test_parse_date_range() {
        // ---
        let day = |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        assert_eq!(
            parse_date_range(Some("2025-03-01"), Some("2025-03-26")),
            Ok((day("2025-03-01"), day("2025-03-26")))
        );
        assert!(parse_date_range(None, Some("2025-03-26")).is_err());
        assert!(parse_date_range(Some("2025-3-1"), Some("2025-03-26")).is_err());
        assert!(parse_date_range(Some("2025-02-30"), Some("2025-03-26")).is_err());
        assert_eq!(
            parse_date_range(Some("2025-03-27"), Some("2025-03-26")),
            Err("startDate cannot be after endDate.")
        );
    }

    #[test]
    fn test_csv_has_header_when_empty() {
        // ---
        let body = String::from_utf8(readings_csv(&[]).unwrap()).unwrap();
        assert_eq!(body.trim_end(), CSV_HEADER.join(","));
    }

    #[test]
    fn test_csv_rows_follow_header() {
        // ---
        let ts = Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap();
        let mut reading = sample_reading(ts).into_reading(7, Some("http://img/7.png".into()));
        reading.ambient_rain = None;

        let body = String::from_utf8(readings_csv(&[reading]).unwrap()).unwrap();
        let mut lines = body.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER.join(","));

        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row.len(), CSV_HEADER.len());
        assert_eq!(row[0], "7");
        assert!(row[1].starts_with("2025-03-26T18:45:00"));
        assert_eq!(row[14], "");
        assert_eq!(row[18], "http://img/7.png");
    }

    #[tokio::test]
    async fn test_live_is_404_when_empty_then_latest() {
        // ---
        let h = harness(0.1);
        assert_eq!(live(State(h.state.clone())).await.status(), StatusCode::NOT_FOUND);

        h.store.push(
            sample_reading(Utc.with_ymd_and_hms(2025, 3, 26, 18, 0, 0).unwrap()),
            None,
        );
        assert_eq!(live(State(h.state.clone())).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_historical_statuses() {
        // ---
        let h = harness(0.1);
        let query = |s: &str, e: &str| {
            Query(HistoricalQuery {
                start_date: Some(s.to_string()),
                end_date: Some(e.to_string()),
            })
        };

        let resp = historical(query("2025-03-26", "2025-03-01"), State(h.state.clone())).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = historical(query("2025-03-01", "2025-03-26"), State(h.state.clone())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        h.store.push(
            sample_reading(Utc.with_ymd_and_hms(2025, 3, 26, 23, 0, 0).unwrap()),
            None,
        );
        let resp = historical(query("2025-03-01", "2025-03-26"), State(h.state.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_export_requires_iso_bounds() {
        // ---
        let h = harness(0.1);
        let resp = export_csv(
            Query(ExportQuery {
                start: Some("yesterday".to_string()),
                end: None,
            }),
            State(h.state.clone()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = export_csv(
            Query(ExportQuery {
                start: Some("2025-03-26T00:00:00Z".to_string()),
                end: Some("2025-03-27T00:00:00Z".to_string()),
            }),
            State(h.state.clone()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/csv"
        );
    }
}
