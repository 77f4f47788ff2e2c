use std::sync::Arc;

use crate::{
    frames::FrameFetcher, ingest::ImageStore, inference::ForecastModels, store::WeatherStore,
    Config,
};

/// Services shared by every request. Everything behind an `Arc` is read-only
/// after startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WeatherStore>,
    pub models: Arc<ForecastModels>,
    pub fetcher: Arc<dyn FrameFetcher>,
    pub images: Arc<dyn ImageStore>,
    pub config: Config,
}
