use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

/// Liveness plus the settings a client needs before posting predictions.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Readings replicated per sequence prediction.
    pub sequence_window: usize,
    pub recording: bool,
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub(crate) async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let recording = state.device.snapshot().await.recording;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sequence_window: state.config.sequence.window,
        recording,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
