//! Persistence seam for readings, image links and forecasts.
//!
//! [`WeatherStore`] is what the pipelines and routes talk to; [`PgWeatherStore`]
//! is the PostgreSQL implementation used by the binary. All time bounds are
//! UTC instants.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::models::{NewReading, Reading, SequenceForecast, TabularForecast};

// ---

#[async_trait]
pub trait WeatherStore: Send + Sync {
    /// Insert a reading and upsert its image link in one transaction.
    /// Returns the new reading id; on error neither row is written.
    async fn insert_reading_with_image(
        &self,
        reading: &NewReading,
        image_url: &str,
    ) -> Result<i64, sqlx::Error>;

    /// A single reading with its image URL, if it exists.
    async fn reading_with_image(&self, id: i64) -> Result<Option<Reading>, sqlx::Error>;

    /// The `limit` most recent readings, newest first.
    async fn latest_readings(&self, limit: i64) -> Result<Vec<Reading>, sqlx::Error>;

    /// Number of readings with `start <= timestamp < end`.
    async fn count_readings_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error>;

    /// Readings with `start <= timestamp < end`, oldest first.
    async fn readings_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, sqlx::Error>;

    /// Readings whose UTC calendar date lies in `[start, end]`, oldest first.
    async fn readings_on_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reading>, sqlx::Error>;

    /// Readings with `start <= timestamp <= end`, oldest first.
    async fn readings_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, sqlx::Error>;

    async fn insert_tabular_forecast(
        &self,
        forecast_date: DateTime<Utc>,
        five_min: f64,
    ) -> Result<i64, sqlx::Error>;

    async fn latest_tabular_forecast(&self) -> Result<Option<TabularForecast>, sqlx::Error>;

    async fn sequence_forecast_exists(
        &self,
        forecast_time: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>;

    /// Insert an image-sequence forecast. Returns `None` when a row for
    /// `forecast_time` already exists.
    async fn insert_sequence_forecast(
        &self,
        weather_data_id: i64,
        forecast_time: DateTime<Utc>,
        lux_forecast: f64,
    ) -> Result<Option<i64>, sqlx::Error>;

    /// The earliest image-sequence forecast strictly after `after`.
    async fn next_sequence_forecast(
        &self,
        after: DateTime<Utc>,
    ) -> Result<Option<SequenceForecast>, sqlx::Error>;
}

/// Shared projection: every reading column plus the joined image URL.
const READING_SELECT: &str = r#"
    SELECT wd.id, wd.timestamp,
           wd.temperature_c, wd.temperature_f, wd.humidity,
           wd.wind_speed, wd.wind_direction, wd.pressure,
           wd.ambient_battery_ok, wd.ambient_temp, wd.ambient_humidity,
           wd.ambient_wind_direction, wd.ambient_wind_speed, wd.ambient_wind_max_speed,
           wd.ambient_rain, wd.ambient_uv, wd.ambient_uvi, wd.ambient_light_lux,
           wi.image_url
    FROM weather_data wd
    LEFT JOIN weather_images wi ON wd.id = wi.weather_data_id
"#;

#[derive(Debug, Clone)]
pub struct PgWeatherStore {
    pool: PgPool,
}

impl PgWeatherStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WeatherStore for PgWeatherStore {
    async fn insert_reading_with_image(
        &self,
        reading: &NewReading,
        image_url: &str,
    ) -> Result<i64, sqlx::Error> {
        // ---
        // Dropping `tx` before commit rolls both statements back
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO weather_data (
                timestamp, temperature_c, temperature_f, humidity,
                wind_speed, wind_direction, pressure,
                ambient_battery_ok, ambient_temp, ambient_humidity,
                ambient_wind_direction, ambient_wind_speed, ambient_wind_max_speed,
                ambient_rain, ambient_uv, ambient_uvi, ambient_light_lux
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING id
            "#,
        )
        .bind(reading.timestamp)
        .bind(reading.temperature_c)
        .bind(reading.temperature_f)
        .bind(reading.humidity)
        .bind(reading.wind_speed)
        .bind(reading.wind_direction)
        .bind(reading.pressure)
        .bind(reading.ambient_battery_ok)
        .bind(reading.ambient_temp)
        .bind(reading.ambient_humidity)
        .bind(reading.ambient_wind_direction)
        .bind(reading.ambient_wind_speed)
        .bind(reading.ambient_wind_max_speed)
        .bind(reading.ambient_rain)
        .bind(reading.ambient_uv)
        .bind(reading.ambient_uvi)
        .bind(reading.ambient_light_lux)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO weather_images (weather_data_id, image_url)
            VALUES ($1, $2)
            ON CONFLICT (weather_data_id) DO UPDATE SET
                image_url = EXCLUDED.image_url,
                timestamp = NOW()
            "#,
        )
        .bind(id)
        .bind(image_url)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn reading_with_image(&self, id: i64) -> Result<Option<Reading>, sqlx::Error> {
        // ---
        let sql = format!("{READING_SELECT} WHERE wd.id = $1");
        sqlx::query_as::<_, Reading>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn latest_readings(&self, limit: i64) -> Result<Vec<Reading>, sqlx::Error> {
        // ---
        let sql = format!("{READING_SELECT} ORDER BY wd.timestamp DESC LIMIT $1");
        sqlx::query_as::<_, Reading>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }

    async fn count_readings_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        // ---
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM weather_data WHERE timestamp >= $1 AND timestamp < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
    }

    async fn readings_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, sqlx::Error> {
        // ---
        let sql = format!(
            "{READING_SELECT} WHERE wd.timestamp >= $1 AND wd.timestamp < $2 \
             ORDER BY wd.timestamp ASC"
        );
        sqlx::query_as::<_, Reading>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
    }

    async fn readings_on_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reading>, sqlx::Error> {
        // ---
        let sql = format!(
            "{READING_SELECT} WHERE (wd.timestamp AT TIME ZONE 'UTC')::date BETWEEN $1 AND $2 \
             ORDER BY wd.timestamp ASC"
        );
        sqlx::query_as::<_, Reading>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
    }

    async fn readings_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, sqlx::Error> {
        // ---
        let sql = format!(
            "{READING_SELECT} WHERE wd.timestamp BETWEEN $1 AND $2 ORDER BY wd.timestamp ASC"
        );
        sqlx::query_as::<_, Reading>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
    }

    async fn insert_tabular_forecast(
        &self,
        forecast_date: DateTime<Utc>,
        five_min: f64,
    ) -> Result<i64, sqlx::Error> {
        // ---
        sqlx::query_scalar(
            r#"
            INSERT INTO forecasts (forecast_date, five_min, fifteen_min, thirty_min, sixty_min)
            VALUES ($1, $2, 0, 0, 0)
            RETURNING id
            "#,
        )
        .bind(forecast_date)
        .bind(five_min)
        .fetch_one(&self.pool)
        .await
    }

    async fn latest_tabular_forecast(&self) -> Result<Option<TabularForecast>, sqlx::Error> {
        // ---
        sqlx::query_as::<_, TabularForecast>(
            r#"
            SELECT id, forecast_date, five_min, fifteen_min, thirty_min, sixty_min
            FROM forecasts
            ORDER BY forecast_date DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
    }

    async fn sequence_forecast_exists(
        &self,
        forecast_time: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        // ---
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM cnn_forecasts WHERE forecast_time = $1)")
            .bind(forecast_time)
            .fetch_one(&self.pool)
            .await
    }

    async fn insert_sequence_forecast(
        &self,
        weather_data_id: i64,
        forecast_time: DateTime<Utc>,
        lux_forecast: f64,
    ) -> Result<Option<i64>, sqlx::Error> {
        // ---
        sqlx::query_scalar(
            r#"
            INSERT INTO cnn_forecasts (weather_data_id, forecast_time, lux_forecast)
            VALUES ($1, $2, $3)
            ON CONFLICT (forecast_time) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(weather_data_id)
        .bind(forecast_time)
        .bind(lux_forecast)
        .fetch_optional(&self.pool)
        .await
    }

    async fn next_sequence_forecast(
        &self,
        after: DateTime<Utc>,
    ) -> Result<Option<SequenceForecast>, sqlx::Error> {
        // ---
        sqlx::query_as::<_, SequenceForecast>(
            r#"
            SELECT id, weather_data_id, forecast_time, lux_forecast, created_at
            FROM cnn_forecasts
            WHERE forecast_time > $1
            ORDER BY forecast_time ASC
            LIMIT 1
            "#,
        )
        .bind(after)
        .fetch_optional(&self.pool)
        .await
    }
}
