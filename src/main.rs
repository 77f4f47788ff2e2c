//! Application entry point for the `skycast` backend service.
//!
//! This binary orchestrates the full startup sequence for the weather-station
//! ingestion and lux forecasting API, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool
//! - Creating the database schema if it does not exist
//! - Loading the image-sequence model and the lux scaler once
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `CNN_MODEL_PATH`, `LSTM_MODEL_PATH`, `SCALER_PATH` (optional) – model artifacts
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the full list.
use std::{env, io::IsTerminal, net::SocketAddr, sync::Arc};

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

mod config;
mod error;
mod forecast;
mod frames;
mod inference;
mod ingest;
mod models;
mod routes;
mod scaler;
mod schema;
mod state;
mod store;

pub use config::Config;
pub use state::AppState;

use frames::HttpFrameFetcher;
use inference::{ForecastModels, OnnxLoader};
use ingest::LocalImageStore;
use store::PgWeatherStore;

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database: {}", cfg.masked_db_url());

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to connect to database '{}': {}",
                cfg.masked_db_url(),
                e
            )
        })?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    // Model and scaler are loaded exactly once here and never reloaded
    let models = ForecastModels::init(&cfg, Arc::new(OnnxLoader));

    let state = AppState {
        store: Arc::new(PgWeatherStore::new(pool)),
        models: Arc::new(models),
        fetcher: Arc::new(HttpFrameFetcher::new()),
        images: Arc::new(LocalImageStore::new(
            cfg.image_dir.clone(),
            &cfg.image_base_url,
        )),
        config: cfg.clone(),
    };

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `AXUM_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        // tract is chatty at debug while optimizing models
        EnvFilter::new(format!("{level},sqlx::query=warn,tract_core=info,tract_onnx=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
