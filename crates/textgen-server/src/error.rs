//! HTTP error handling and response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use textgen_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server at capacity")]
    ServiceUnavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Engine(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_request_error",
            ServerError::Engine(EngineError::Configuration(_)) => "configuration_error",
            ServerError::Engine(EngineError::Runtime(_)) => "runtime_error",
            ServerError::ServiceUnavailable | ServerError::Internal(_) => "server_error",
        }
    }

    /// JSON error body: `{"error": {"message", "type"}}`.
    pub fn body(&self) -> Value {
        let message = match self {
            ServerError::ServiceUnavailable => "Server at capacity, try again later".to_string(),
            other => other.to_string(),
        };
        json!({
            "error": {
                "message": message,
                "type": self.error_type(),
            }
        })
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ServerError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::ServiceUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::from(EngineError::Runtime("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::from(EngineError::Configuration("bad".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn body_carries_message_and_type() {
        let body = ServerError::from(EngineError::Runtime("decode failed".into())).body();
        assert_eq!(body["error"]["type"], "runtime_error");
        assert_eq!(body["error"]["message"], "runtime error: decode failed");
    }

    #[test]
    fn capacity_message_is_friendly() {
        let body = ServerError::ServiceUnavailable.body();
        assert_eq!(body["error"]["message"], "Server at capacity, try again later");
        assert_eq!(body["error"]["type"], "server_error");
    }
}
