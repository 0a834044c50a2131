use axum::{extract::State, Json};
use serde_json::{json, Value};
use crate::api::AppState;
use crate::api::models::OnlineResponse;

/// Always answers with a boolean; a failed check reads as offline.
pub async fn check_is_vas_online(State(state): State<AppState>) -> Json<OnlineResponse> {
    Json(OnlineResponse {
        online: state.readiness.is_ready().await,
    })
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "openvas-agent",
        "version": env!("CARGO_PKG_VERSION"),
        "git_hash": option_env!("GIT_HASH").unwrap_or("unknown"),
        "built": option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
    }))
}
