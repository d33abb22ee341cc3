use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bookrec_core::RecError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Server-specific error types.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Core error: {0}")]
    CoreError(#[from] RecError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::CoreError(core_err) => match core_err {
                RecError::IndexUnavailable(_) | RecError::ModelMismatch { .. } | RecError::InconsistentState(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                RecError::DimensionMismatch { .. } | RecError::InvalidArgument(_) | RecError::Configuration(_) => {
                    StatusCode::BAD_REQUEST
                }
                RecError::Embedding(_) => StatusCode::BAD_GATEWAY,
                RecError::IoError { .. }
                | RecError::Serialization(_)
                | RecError::CorruptFile { .. }
                | RecError::Source(_)
                | RecError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

// Implement IntoResponse for ServerError to automatically convert errors into HTTP responses.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            ServerError::BadRequest(reason) => format!("Bad request: {}", reason),
            ServerError::Conflict(reason) => reason.clone(),
            ServerError::CoreError(RecError::IndexUnavailable(reason)) => {
                format!("Recommendations unavailable: {}", reason)
            }
            ServerError::CoreError(core_err @ (RecError::ModelMismatch { .. } | RecError::InconsistentState(_))) => {
                warn!(error = %core_err, "Index on disk cannot be served");
                format!("Recommendations unavailable: {}", core_err)
            }
            ServerError::CoreError(RecError::DimensionMismatch { expected, actual }) => {
                format!("Dimension mismatch: expected {}, got {}", expected, actual)
            }
            ServerError::CoreError(core_err) if status.is_client_error() => core_err.to_string(),
            ServerError::CoreError(RecError::Embedding(msg)) => {
                error!(error = %msg, "Embedding provider failed");
                "Embedding provider failed".to_string()
            }
            ServerError::CoreError(core_err) => {
                error!(error = %core_err, "Core error");
                "Internal server error".to_string()
            }
            ServerError::Internal(msg) => {
                error!(error = %msg, "Internal server error");
                "Internal server error".to_string()
            }
        };

        if status.is_server_error() {
            error!("Responding with status {}: {}", status, error_message);
        }

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

// Define a Result type alias for handler functions
pub type ServerResult<T> = Result<T, ServerError>;
