use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use crate::cli::commands::ServeArgs;
use crate::config::AgentConfig;
use crate::errors::AgentError;
use crate::telemetry::{host_name, HttpBackend, TelemetryScheduler};
use crate::api;

pub async fn handle_serve(args: ServeArgs, config: AgentConfig) -> Result<(), AgentError> {
    info!(host = %args.host, port = args.port, "Starting API server");

    let shutdown = CancellationToken::new();
    let sessions = super::engine_sessions(&config);
    let state = api::create_app_state(&config, sessions, shutdown.clone());

    let backend = HttpBackend::new(&config.backend)?;
    let scheduler = Arc::new(TelemetryScheduler::new(
        state.orchestrator.clone(),
        state.normalizer.clone(),
        state.readiness.clone(),
        Arc::new(backend),
        host_name(),
        config.backend.clone(),
    ));
    let loops = scheduler.spawn(&shutdown);

    let app = api::build_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
                _ = signal.cancelled() => {}
            }
            signal.cancel();
        })
        .await;

    shutdown.cancel();
    for handle in loops {
        if let Err(e) = handle.await {
            warn!(error = %e, "Telemetry loop ended abnormally");
        }
    }

    served.map_err(|e| AgentError::Internal(format!("Server error: {}", e)))
}
