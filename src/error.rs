// error.rs
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Structured control failures, reported in-band on `ControlResponse` and
/// never raised as transport errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFailure {
    #[error("Device not found")]
    NotFound,
    #[error("Device is offline")]
    Offline,
    #[error("Communication timeout")]
    Timeout,
}

/// Unstructured channel faults, the only errors the transport trait itself
/// returns. Caught once at the controller boundary.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport channel failed: {0}")]
    Channel(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Device not found")]
    DeviceNotFound,
    #[error("A scan is already in progress")]
    ScanInProgress,
    #[error("Transport fault: {0}")]
    Transport(#[from] TransportError),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::DeviceNotFound => StatusCode::NOT_FOUND,
            AppError::ScanInProgress => StatusCode::CONFLICT,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
