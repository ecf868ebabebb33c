use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt::Display;

use crate::services::estimator::ModelKind;

/// Failures raised by the estimation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EstimatorError {
    #[error("column mapping does not match the uploaded table: {0}")]
    Schema(String),

    #[error("{} model not trained yet for this session; train first", .kind.label())]
    ModelNotTrained { kind: ModelKind },

    #[error("duration map is empty; training produced no usable rows")]
    DurationMapEmpty,

    #[error("artifact '{key}' not found")]
    ArtifactNotFound { key: String },

    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("invalid number for {field}: '{value}'")]
    InvalidNumber { field: String, value: String },

    #[error("unsupported model type '{0}'")]
    UnknownModelKind(String),

    #[error("recording cannot be labelled: {0}")]
    RecordingTooShort(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl EstimatorError {
    pub fn invalid_number(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidNumber {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Schema(_)
            | Self::ModelNotTrained { .. }
            | Self::InvalidNumber { .. }
            | Self::UnknownModelKind(_)
            | Self::RecordingTooShort(_) => StatusCode::BAD_REQUEST,
            Self::UnknownSession(_) => StatusCode::NOT_FOUND,
            Self::DurationMapEmpty
            | Self::ArtifactNotFound { .. }
            | Self::Model(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T, E = EstimatorError> = std::result::Result<T, E>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<EstimatorError> for AppError {
    fn from(err: EstimatorError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            tracing::error!(error = %err, "estimator failure");
        } else {
            tracing::warn!(error = %err, "rejected estimator request");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

pub fn internal_error(err: impl Display) -> AppError {
    tracing::error!(error = %err, "internal error");
    AppError::internal("Internal server error")
}
