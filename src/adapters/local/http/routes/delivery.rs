use super::super::AppState;
use crate::application::delivery::SourceStats;
use crate::domain::poller::NextVideo;
use crate::error::{Error, Result};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

const CLIP_NUMBER_HEADER: &str = "x-clip-number";
const CLIP_DURATION_HEADER: &str = "x-clip-duration";

pub async fn next_video(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<NextVideo>> {
    Ok(Json(state.delivery.peek_next(&token)?))
}

pub async fn video(
    State(state): State<AppState>,
    Path((token, clip_number)): Path<(String, u64)>,
) -> Result<Response> {
    let clip = state
        .delivery
        .fetch(&token, clip_number)?
        .ok_or_else(|| Error::NotFound(format!("clip {}", clip_number)))?;

    let headers = [
        (header::CONTENT_TYPE.as_str(), state.content_type.clone()),
        (CLIP_NUMBER_HEADER, clip.clip_number.to_string()),
        (CLIP_DURATION_HEADER, clip.duration.to_string()),
    ];
    Ok((headers, clip.payload).into_response())
}

pub async fn stats(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SourceStats>> {
    Ok(Json(state.delivery.stats(&token)?))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
