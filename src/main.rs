mod api;
mod config;
mod dataset;
mod error;
mod models;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use config::Config;
use dataset::Dataset;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<Dataset>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tag_trends_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    // One-time blocking load; the service starts with an empty dataset
    // if the spreadsheet is missing or malformed.
    let dataset = Arc::new(Dataset::load_or_empty(&config.dataset_path));
    info!(
        records = dataset.len(),
        tags = dataset.tags().len(),
        years = dataset.years().len(),
        "Dataset ready"
    );

    let state = AppState { dataset };

    let app = Router::new()
        .route("/healthz", get(api::healthz))
        .route("/get_tags", get(api::get_tags))
        .route("/get_years", get(api::get_years))
        .route("/get_data", post(api::get_data))
        .route("/top_tags", post(api::top_tags))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("tag-trends-api listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
