pub mod routes;
pub mod models;
pub mod errors;
pub mod waits;

use std::sync::Arc;
use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use crate::engine::SessionFactory;
use crate::config::AgentConfig;
use crate::readiness::ReadinessMonitor;
use crate::reporting::ReportNormalizer;
use crate::scan::ScanOrchestrator;
use waits::WaitRegistry;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ScanOrchestrator>,
    pub normalizer: Arc<ReportNormalizer>,
    pub readiness: Arc<ReadinessMonitor>,
    /// In-flight `wait_task` calls; cancelled with the shutdown token.
    pub waits: Arc<WaitRegistry>,
}

pub fn create_app_state(
    config: &AgentConfig,
    sessions: Arc<dyn SessionFactory>,
    shutdown: CancellationToken,
) -> AppState {
    AppState {
        orchestrator: Arc::new(ScanOrchestrator::new(sessions.clone(), config.scan.clone())),
        normalizer: Arc::new(ReportNormalizer::new(sessions.clone())),
        readiness: Arc::new(ReadinessMonitor::new(
            sessions,
            config.engine.log_file.clone(),
            config.engine.ready_marker.clone(),
        )),
        waits: Arc::new(WaitRegistry::new(shutdown)),
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::status::health_check))
        .route("/start_scan", post(routes::scans::start_scan))
        .route("/wait_task/:task_id", get(routes::scans::wait_task))
        .route("/wait_task/:task_id/cancel", post(routes::scans::cancel_wait))
        .route("/get_scanned_targets_count", get(routes::scans::scanned_targets_count))
        .route("/check_is_vas_online", get(routes::status::check_is_vas_online))
        .route("/get_results", get(routes::results::get_results))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
