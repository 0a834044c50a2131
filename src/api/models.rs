use serde::{Deserialize, Serialize};
use crate::models::FindingRecord;

#[derive(Deserialize)]
pub struct StartScanRequest {
    pub target: String,
    /// Scan profile; the configured default when absent.
    pub config_id: Option<String>,
}

#[derive(Serialize)]
pub struct StartScanResponse {
    pub task_id: String,
}

#[derive(Serialize)]
pub struct WaitTaskResponse {
    pub result: bool,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Serialize)]
pub struct OnlineResponse {
    pub online: bool,
}

#[derive(Serialize)]
pub struct ResultsResponse {
    pub results: Vec<FindingRecord>,
}
