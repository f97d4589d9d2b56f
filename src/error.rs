// Error handling module
// Defines the load balancer's error taxonomy and HTTP response conversion

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors raised by routing, dispatch and the benchmark client
#[derive(Error, Debug)]
pub enum RouterError {
    /// Malformed or empty throughput table / backend registry. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A routing policy was invoked without the inputs it requires
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Dispatcher or backend unreachable, connection reset, read timeout
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A peer answered, but not in the shape the protocol expects
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Backend answered the completion request with a non-success status
    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    /// Request corpus could not be read or parsed
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Dispatch body that is not the JSON the dispatcher expects
    #[error("Validation error: {0}")]
    Validation(String),
}

impl RouterError {
    /// Short label used in logs and error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            RouterError::Configuration(_) => "config_error",
            RouterError::ContractViolation(_) => "contract_violation",
            RouterError::Transport(_) => "transport_error",
            RouterError::Protocol(_) => "protocol_error",
            RouterError::Backend { .. } => "backend_error",
            RouterError::Dataset(_) => "dataset_error",
            RouterError::Validation(_) => "validation_error",
        }
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = match self {
            RouterError::ContractViolation(msg) | RouterError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            RouterError::Configuration(msg) | RouterError::Dataset(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            RouterError::Transport(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            RouterError::Protocol(msg) => (StatusCode::BAD_GATEWAY, msg),
            RouterError::Backend { status, message } => {
                let status_code =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status_code, message)
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": kind,
            }
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for RouterError {
    fn from(rejection: JsonRejection) -> Self {
        RouterError::Validation(rejection.body_text())
    }
}

/// Result type alias for routing and benchmark operations
pub type Result<T> = std::result::Result<T, RouterError>;
