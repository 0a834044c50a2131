use axum::{extract::State, Json};
use crate::api::AppState;
use crate::api::models::ResultsResponse;
use crate::errors::AgentError;

pub async fn get_results(
    State(state): State<AppState>,
) -> Result<Json<ResultsResponse>, AgentError> {
    let results = state.normalizer.get_results().await?;
    Ok(Json(ResultsResponse { results }))
}
