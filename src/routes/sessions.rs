use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::error::{internal_error, AppError, AppResult};
use crate::services::estimator::predict::{self, PredictRequest, PredictResponse};
use crate::services::estimator::train::{self, TrainRequest, TrainResponse};
use crate::services::estimator::{ModelKind, SessionId};
use crate::services::uploads::UploadReceipt;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "sessions",
    request_body(content = String, content_type = "text/csv", description = "Raw sensor CSV"),
    responses(
        (status = 200, description = "Upload stored under a new session", body = UploadReceipt),
        (status = 400, description = "Empty or malformed CSV")
    )
)]
pub(crate) async fn upload(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<UploadReceipt>> {
    if body.is_empty() {
        return Err(AppError::bad_request("No file content"));
    }
    let receipt = state.uploads.save(&body).await?;
    Ok(Json(receipt))
}

#[utoipa::path(
    post,
    path = "/api/train",
    tag = "sessions",
    request_body = TrainRequest,
    responses(
        (status = 200, description = "Training summary", body = TrainResponse),
        (status = 400, description = "Mapping does not match the upload"),
        (status = 404, description = "Unknown session")
    )
)]
pub(crate) async fn train_session(
    State(state): State<AppState>,
    Json(payload): Json<TrainRequest>,
) -> AppResult<Json<TrainResponse>> {
    let session = SessionId::parse(&payload.session_id)?;
    let kind: ModelKind = payload
        .model_type
        .as_deref()
        .unwrap_or_default()
        .parse()?;
    let table = state.uploads.load(session).await?;
    let models = state.models.clone();
    let params = state.config.training_params();

    let response = tokio::task::spawn_blocking(move || {
        train::train(
            models.as_ref(),
            &table,
            session,
            &payload.mapping,
            kind,
            &params,
        )
    })
    .await
    .map_err(internal_error)??;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/predict",
    tag = "sessions",
    request_body = PredictRequest,
    responses(
        (status = 200, description = "Estimated SoC and remaining time", body = PredictResponse),
        (status = 400, description = "Model not trained or invalid input"),
        (status = 404, description = "Unknown session")
    )
)]
pub(crate) async fn predict_session(
    State(state): State<AppState>,
    Json(payload): Json<PredictRequest>,
) -> AppResult<Json<PredictResponse>> {
    let models = state.models.clone();
    let response = tokio::task::spawn_blocking(move || predict::predict(models.as_ref(), &payload))
        .await
        .map_err(internal_error)??;
    Ok(Json(response))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/train", post(train_session))
        .route("/predict", post(predict_session))
}
