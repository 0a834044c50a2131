use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use crate::errors::AgentError;

impl IntoResponse for AgentError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AgentError::InvalidTarget(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AgentError::Config(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AgentError::Session(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, Json(json!({"error": message}))).into_response()
    }
}
