//! Database schema management for `skycast`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates `weather_data` for raw readings, `weather_images` for the
/// one-to-one image links, and the two forecast tables `forecasts` (tabular)
/// and `cnn_forecasts` (image sequence). Safe to call on every startup;
/// no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weather_data (
            id                      BIGSERIAL PRIMARY KEY,
            timestamp               TIMESTAMPTZ      NOT NULL,
            temperature_c           DOUBLE PRECISION,
            temperature_f           DOUBLE PRECISION,
            humidity                DOUBLE PRECISION,
            wind_speed              DOUBLE PRECISION,
            wind_direction          DOUBLE PRECISION,
            pressure                DOUBLE PRECISION,
            ambient_battery_ok      INTEGER,
            ambient_temp            DOUBLE PRECISION,
            ambient_humidity        DOUBLE PRECISION,
            ambient_wind_direction  DOUBLE PRECISION,
            ambient_wind_speed      DOUBLE PRECISION,
            ambient_wind_max_speed  DOUBLE PRECISION,
            ambient_rain            DOUBLE PRECISION,
            ambient_uv              DOUBLE PRECISION,
            ambient_uvi             DOUBLE PRECISION,
            ambient_light_lux       DOUBLE PRECISION
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // One image per reading; upserts key on weather_data_id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weather_images (
            id               BIGSERIAL PRIMARY KEY,
            weather_data_id  BIGINT      NOT NULL UNIQUE
                             REFERENCES weather_data (id),
            image_url        TEXT        NOT NULL,
            timestamp        TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS forecasts (
            id             BIGSERIAL PRIMARY KEY,
            forecast_date  TIMESTAMPTZ      NOT NULL,
            five_min       DOUBLE PRECISION NOT NULL,
            fifteen_min    DOUBLE PRECISION NOT NULL DEFAULT 0,
            thirty_min     DOUBLE PRECISION NOT NULL DEFAULT 0,
            sixty_min      DOUBLE PRECISION NOT NULL DEFAULT 0
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // forecast_time is unique so concurrent triggers cannot double-insert
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cnn_forecasts (
            id               BIGSERIAL PRIMARY KEY,
            weather_data_id  BIGINT           NOT NULL REFERENCES weather_data (id),
            forecast_time    TIMESTAMPTZ      NOT NULL UNIQUE,
            lux_forecast     DOUBLE PRECISION NOT NULL,
            created_at       TIMESTAMPTZ      NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_weather_data_timestamp
            ON weather_data (timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_forecasts_forecast_date
            ON forecasts (forecast_date);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
