use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "soc-estimator",
        description = "Battery state-of-charge and remaining-time estimation"
    ),
    paths(
        crate::routes::health::health_handler,
        crate::routes::sessions::upload,
        crate::routes::sessions::train_session,
        crate::routes::sessions::predict_session,
        crate::routes::live::push_reading,
        crate::routes::live::get_live,
        crate::routes::live::start_recording,
        crate::routes::live::stop_recording,
    ),
    components(schemas(
        crate::routes::health::HealthResponse,
        crate::routes::live::LiveReadingRequest,
        crate::services::uploads::UploadReceipt,
        crate::services::estimator::ModelKind,
        crate::services::estimator::ColumnMapping,
        crate::services::estimator::train::TrainRequest,
        crate::services::estimator::train::TrainResponse,
        crate::services::estimator::train::GraphData,
        crate::services::estimator::predict::NumericInput,
        crate::services::estimator::predict::PredictRequest,
        crate::services::estimator::predict::PredictResponse,
        crate::services::device_state::LiveReading,
        crate::services::device_state::LiveSnapshot,
    )),
    tags(
        (name = "sessions", description = "Upload, train and predict per session"),
        (name = "live", description = "Hardware bridge readings and recordings")
    )
)]
pub struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to render openapi document");
        serde_json::Value::Null
    })
}

async fn openapi_handler() -> Json<serde_json::Value> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_handler))
}
