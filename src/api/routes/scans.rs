use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;
use crate::api::AppState;
use crate::api::models::{CountResponse, StartScanRequest, StartScanResponse, WaitTaskResponse};
use crate::errors::AgentError;

pub async fn start_scan(
    State(state): State<AppState>,
    Json(req): Json<StartScanRequest>,
) -> Result<Json<StartScanResponse>, AgentError> {
    let config_id = req
        .config_id
        .as_deref()
        .unwrap_or_else(|| state.orchestrator.default_config_id())
        .to_string();
    let task_id = state.orchestrator.start_scan(&req.target, &config_id).await?;
    Ok(Json(StartScanResponse { task_id }))
}

/// Blocks until the task is done. The wait can be stopped through
/// `POST /wait_task/{task_id}/cancel`, which answers `result: false`.
pub async fn wait_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<WaitTaskResponse>, AgentError> {
    // Held across the wait; dropping it (completion or client gone) releases
    // this waiter's claim.
    let registration = state.waits.register(&task_id);
    let result = state.orchestrator.wait_task(&task_id, registration.token()).await?;
    Ok(Json(WaitTaskResponse { result }))
}

pub async fn cancel_wait(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if state.waits.cancel(&task_id) {
        info!(task_id = %task_id, "Wait cancelled by request");
        Ok(Json(json!({"cancelled": true})))
    } else {
        Err((StatusCode::NOT_FOUND, Json(json!({"error": "No pending wait for task"}))))
    }
}

pub async fn scanned_targets_count(
    State(state): State<AppState>,
) -> Result<Json<CountResponse>, AgentError> {
    let count = state.orchestrator.active_scans_count().await?;
    Ok(Json(CountResponse { count }))
}
