//! Data models for weather readings and the two forecast tables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

// ---

/// A stored weather-station reading joined with its sky-camera image URL.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Reading {
    // ---
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub temperature_c: Option<f64>,
    pub temperature_f: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub pressure: Option<f64>,
    pub ambient_battery_ok: Option<i32>,
    pub ambient_temp: Option<f64>,
    pub ambient_humidity: Option<f64>,
    pub ambient_wind_direction: Option<f64>,
    pub ambient_wind_speed: Option<f64>,
    pub ambient_wind_max_speed: Option<f64>,
    pub ambient_rain: Option<f64>,
    pub ambient_uv: Option<f64>,
    pub ambient_uvi: Option<f64>,
    pub ambient_light_lux: Option<f64>,
    pub image_url: Option<String>,
}

/// Reading payload accepted by the ingestion endpoint, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    // ---
    pub timestamp: DateTime<Utc>,
    pub temperature_c: Option<f64>,
    pub temperature_f: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub pressure: Option<f64>,
    pub ambient_battery_ok: Option<i32>,
    pub ambient_temp: Option<f64>,
    pub ambient_humidity: Option<f64>,
    pub ambient_wind_direction: Option<f64>,
    pub ambient_wind_speed: Option<f64>,
    pub ambient_wind_max_speed: Option<f64>,
    pub ambient_rain: Option<f64>,
    pub ambient_uv: Option<f64>,
    pub ambient_uvi: Option<f64>,
    pub ambient_light_lux: Option<f64>,
}

/// Row of the `forecasts` table produced by the tabular (LSTM) pipeline.
///
/// Only the 5-minute horizon is computed; the longer horizons are stored as 0.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TabularForecast {
    // ---
    pub id: i64,
    pub forecast_date: DateTime<Utc>,
    #[serde(rename = "5minForecast")]
    pub five_min: f64,
    #[serde(rename = "15minForecast")]
    pub fifteen_min: f64,
    #[serde(rename = "30minForecast")]
    pub thirty_min: f64,
    #[serde(rename = "60minForecast")]
    pub sixty_min: f64,
}

/// Row of the `cnn_forecasts` table produced by the image-sequence pipeline.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SequenceForecast {
    // ---
    pub id: i64,
    pub weather_data_id: i64,
    pub forecast_time: DateTime<Utc>,
    pub lux_forecast: f64,
    pub created_at: DateTime<Utc>,
}

impl NewReading {
    // ---
    /// Build a reading from the text fields of an ingestion form.
    ///
    /// `timestamp` is required and must be RFC 3339. Every other field is
    /// optional; empty strings are treated as absent. A present but
    /// unparseable number is an error. Ambient-station fields are accepted
    /// under both their column names and the `ambientWeather*` names the
    /// station firmware posts.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, String> {
        // ---
        let get = |names: &[&str]| {
            names.iter().find_map(|name| {
                fields
                    .get(*name)
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
            })
        };

        let num = |names: &[&str]| -> Result<Option<f64>, String> {
            get(names)
                .map(|v| {
                    v.parse::<f64>()
                        .map_err(|e| format!("invalid {}: {e}", names[0]))
                })
                .transpose()
        };

        let timestamp = get(&["timestamp"]).ok_or_else(|| "timestamp is required".to_string())?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| format!("invalid timestamp: {e}"))?
            .with_timezone(&Utc);

        let ambient_battery_ok = get(&["ambient_battery_ok", "ambientWeatherBatteryOk"])
            .map(|v| match v {
                "true" => Ok(1),
                "false" => Ok(0),
                other => other
                    .parse::<i32>()
                    .map_err(|e| format!("invalid ambient_battery_ok: {e}")),
            })
            .transpose()?;

        Ok(NewReading {
            timestamp,
            temperature_c: num(&["temperature_c"])?,
            temperature_f: num(&["temperature_f"])?,
            humidity: num(&["humidity"])?,
            wind_speed: num(&["wind_speed"])?,
            wind_direction: num(&["wind_direction"])?,
            pressure: num(&["pressure"])?,
            ambient_battery_ok,
            ambient_temp: num(&["ambient_temp", "ambientWeatherTemp"])?,
            ambient_humidity: num(&["ambient_humidity", "ambientWeatherHumidity"])?,
            ambient_wind_direction: num(&["ambient_wind_direction", "ambientWeatherWindDirection"])?,
            ambient_wind_speed: num(&["ambient_wind_speed", "ambientWeatherWindSpeed"])?,
            ambient_wind_max_speed: num(&["ambient_wind_max_speed", "ambientWeatherWindMaxSpeed"])?,
            ambient_rain: num(&["ambient_rain", "ambientWeatherRain"])?,
            ambient_uv: num(&["ambient_uv", "ambientWeatherUV"])?,
            ambient_uvi: num(&["ambient_uvi", "ambientWeatherUVI"])?,
            ambient_light_lux: num(&["ambient_light_lux", "ambientWeatherLightLux"])?,
        })
    }

    /// Materialize this payload as a stored reading with the given id and image.
    pub fn into_reading(self, id: i64, image_url: Option<String>) -> Reading {
        // ---
        Reading {
            id,
            timestamp: self.timestamp,
            temperature_c: self.temperature_c,
            temperature_f: self.temperature_f,
            humidity: self.humidity,
            wind_speed: self.wind_speed,
            wind_direction: self.wind_direction,
            pressure: self.pressure,
            ambient_battery_ok: self.ambient_battery_ok,
            ambient_temp: self.ambient_temp,
            ambient_humidity: self.ambient_humidity,
            ambient_wind_direction: self.ambient_wind_direction,
            ambient_wind_speed: self.ambient_wind_speed,
            ambient_wind_max_speed: self.ambient_wind_max_speed,
            ambient_rain: self.ambient_rain,
            ambient_uv: self.ambient_uv,
            ambient_uvi: self.ambient_uvi,
            ambient_light_lux: self.ambient_light_lux,
            image_url,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_reading(timestamp: DateTime<Utc>) -> NewReading {
    // ---
    NewReading {
        timestamp,
        temperature_c: Some(21.5),
        temperature_f: Some(70.7),
        humidity: Some(48.0),
        wind_speed: Some(3.2),
        wind_direction: Some(180.0),
        pressure: Some(1013.2),
        ambient_battery_ok: Some(1),
        ambient_temp: Some(70.1),
        ambient_humidity: Some(47.0),
        ambient_wind_direction: Some(175.0),
        ambient_wind_speed: Some(3.0),
        ambient_wind_max_speed: Some(5.5),
        ambient_rain: Some(0.0),
        ambient_uv: Some(2.0),
        ambient_uvi: Some(1.0),
        ambient_light_lux: Some(42_000.0),
    }
}
