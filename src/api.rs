use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::{
    models::{TagFrequencyRequest, TagShare, TopTagsRequest},
    AppState,
};

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

pub async fn get_tags(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dataset.tags().to_vec())
}

pub async fn get_years(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dataset.years().to_vec())
}

pub async fn get_data(
    State(state): State<AppState>,
    Json(payload): Json<TagFrequencyRequest>,
) -> impl IntoResponse {
    Json(state.dataset.tag_frequencies(&payload.tags))
}

/// Invalid year filters yield an empty list, not an error status.
pub async fn top_tags(
    State(state): State<AppState>,
    Json(payload): Json<TopTagsRequest>,
) -> impl IntoResponse {
    match payload.year.resolve() {
        Ok(filter) => Json(state.dataset.top_tags(filter)),
        Err(err) => {
            debug!("Rejected top_tags request: {err}");
            Json(Vec::<TagShare>::new())
        }
    }
}
