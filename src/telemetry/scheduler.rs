use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backend::TelemetrySink;
use super::metrics::{MetricsSnapshot, SystemSampler};
use crate::config::BackendConfig;
use crate::errors::AgentError;
use crate::readiness::ReadinessMonitor;
use crate::reporting::ReportNormalizer;
use crate::scan::ScanOrchestrator;

/// Background delivery: a metrics loop and a results loop, each on its own
/// tokio task and each stopped by the shared cancellation token.
pub struct TelemetryScheduler {
    orchestrator: Arc<ScanOrchestrator>,
    normalizer: Arc<ReportNormalizer>,
    readiness: Arc<ReadinessMonitor>,
    sink: Arc<dyn TelemetrySink>,
    sampler: SystemSampler,
    machine_id: String,
    settings: BackendConfig,
}

impl TelemetryScheduler {
    pub fn new(
        orchestrator: Arc<ScanOrchestrator>,
        normalizer: Arc<ReportNormalizer>,
        readiness: Arc<ReadinessMonitor>,
        sink: Arc<dyn TelemetrySink>,
        machine_id: String,
        settings: BackendConfig,
    ) -> Self {
        Self {
            orchestrator,
            normalizer,
            readiness,
            sink,
            sampler: SystemSampler::new(),
            machine_id,
            settings,
        }
    }

    /// Start both loops. They run until `shutdown` is cancelled.
    pub fn spawn(self: Arc<Self>, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let metrics = {
            let this = Arc::clone(&self);
            let cancel = shutdown.child_token();
            tokio::spawn(async move { this.run_metrics_loop(cancel).await })
        };
        let results = {
            let this = Arc::clone(&self);
            let cancel = shutdown.child_token();
            tokio::spawn(async move { this.run_results_loop(cancel).await })
        };
        vec![metrics, results]
    }

    pub async fn run_metrics_loop(&self, cancel: CancellationToken) {
        if cfg!(target_os = "macos") {
            info!("Host metrics are not collected on macOS, metrics loop disabled");
            return;
        }
        run_periodic("metrics", self.settings.metrics_interval(), cancel, move || async move {
            self.metrics_cycle().await.map(|_| ())
        })
        .await;
    }

    pub async fn run_results_loop(&self, cancel: CancellationToken) {
        run_periodic("results", self.settings.results_interval(), cancel, move || async move {
            self.results_cycle().await.map(|_| ())
        })
        .await;
    }

    /// Sample host and engine state, hand out new work if the engine is
    /// online, then push the snapshot.
    pub async fn metrics_cycle(&self) -> Result<MetricsSnapshot, AgentError> {
        let active = match self.orchestrator.active_scans_count().await {
            Ok(count) => count,
            Err(e) => {
                info!(error = %e, "Failed to get active scans count");
                0
            }
        };
        let online = self.readiness.is_ready().await;
        let snapshot = MetricsSnapshot::new(&self.machine_id, active, online, self.sampler.sample());

        if online && self.settings.target_intake {
            self.intake_targets(active).await;
        }

        self.sink.send_metrics(&snapshot).await?;
        Ok(snapshot)
    }

    /// Deliver every current finding if the engine is ready. Returns how
    /// many findings went out.
    pub async fn results_cycle(&self) -> Result<usize, AgentError> {
        if !self.readiness.is_ready().await {
            debug!("Engine not ready, skipping result delivery");
            return Ok(0);
        }

        let mut findings = self.normalizer.get_results().await?;
        if findings.is_empty() {
            debug!("No scan results to deliver");
            return Ok(0);
        }

        for finding in &mut findings {
            finding.stamp_origin(&self.machine_id);
        }
        self.sink.send_findings(&findings).await?;
        Ok(findings.len())
    }

    async fn intake_targets(&self, active: usize) {
        let targets = match self.sink.request_targets(active).await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(error = %e, "Failed to get targets");
                return;
            }
        };

        let config_id = self.orchestrator.default_config_id();
        for target in targets {
            match self.orchestrator.start_scan(&target, config_id).await {
                Ok(task_id) => info!(target = %target, task_id = %task_id, "Started scan for backend target"),
                Err(e) => warn!(target = %target, error = %e, "Failed to start scan for backend target"),
            }
        }
    }
}

/// Run `cycle` every `interval` until `cancel` fires. A failed or panicking
/// cycle is logged and the next one runs as usual.
pub async fn run_periodic<F, Fut>(name: &'static str, interval: Duration, cancel: CancellationToken, mut cycle: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), AgentError>>,
{
    info!(loop_name = name, interval_secs = interval.as_secs(), "Telemetry loop started");
    loop {
        match AssertUnwindSafe(cycle()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                loop_name = name,
                error = %e,
                error_type = e.classify().error_type,
                "Telemetry cycle failed"
            ),
            Err(_) => error!(loop_name = name, "Telemetry cycle panicked"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    info!(loop_name = name, "Telemetry loop stopped");
}
