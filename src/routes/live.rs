use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::services::device_state::{LiveReading, LiveSnapshot};
use crate::services::uploads::UploadReceipt;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub(crate) struct LiveReadingRequest {
    pub(crate) voltage: f64,
    #[serde(default)]
    pub(crate) current: f64,
    #[serde(default, alias = "temperature")]
    pub(crate) temp: f64,
}

#[utoipa::path(
    post,
    path = "/api/live",
    tag = "live",
    request_body = LiveReadingRequest,
    responses(
        (status = 200, description = "Reading accepted", body = LiveReading),
        (status = 400, description = "Non-finite reading")
    )
)]
pub(crate) async fn push_reading(
    State(state): State<AppState>,
    Json(payload): Json<LiveReadingRequest>,
) -> AppResult<Json<LiveReading>> {
    if ![payload.voltage, payload.current, payload.temp]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(AppError::bad_request("readings must be finite numbers"));
    }
    let reading = state
        .device
        .ingest(payload.voltage, payload.current, payload.temp)
        .await;
    Ok(Json(reading))
}

#[utoipa::path(
    get,
    path = "/api/live",
    tag = "live",
    responses((status = 200, description = "Latest reading and recording state", body = LiveSnapshot))
)]
pub(crate) async fn get_live(State(state): State<AppState>) -> Json<LiveSnapshot> {
    Json(state.device.snapshot().await)
}

#[utoipa::path(
    post,
    path = "/api/recording/start",
    tag = "live",
    responses((status = 200, description = "Recording started", body = LiveSnapshot))
)]
pub(crate) async fn start_recording(State(state): State<AppState>) -> Json<LiveSnapshot> {
    Json(state.device.start_recording().await)
}

#[utoipa::path(
    post,
    path = "/api/recording/stop",
    tag = "live",
    responses(
        (status = 200, description = "Recording labelled and stored as a new session", body = UploadReceipt),
        (status = 400, description = "Too few samples to label")
    )
)]
pub(crate) async fn stop_recording(State(state): State<AppState>) -> AppResult<Json<UploadReceipt>> {
    let table = state.device.stop_recording().await?;
    let receipt = state.uploads.save_table(&table).await?;
    Ok(Json(receipt))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/live", get(get_live).post(push_reading))
        .route("/recording/start", post(start_recording))
        .route("/recording/stop", post(stop_recording))
}
