use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScanSettings;
use crate::engine::{with_session, SessionFactory};
use crate::errors::AgentError;
use crate::models::{ScanTarget, ScanTask, TaskStatus};

/// Drives the target -> task -> start -> poll lifecycle on the engine.
pub struct ScanOrchestrator {
    sessions: Arc<dyn SessionFactory>,
    settings: ScanSettings,
}

impl ScanOrchestrator {
    pub fn new(sessions: Arc<dyn SessionFactory>, settings: ScanSettings) -> Self {
        Self { sessions, settings }
    }

    pub fn default_config_id(&self) -> &str {
        &self.settings.config_id
    }

    pub fn poll_interval(&self) -> Duration {
        self.settings.poll_interval()
    }

    /// Register and start a scan of `address`, returning the engine's task id.
    pub async fn start_scan(&self, address: &str, config_id: &str) -> Result<String, AgentError> {
        let task = self.launch(address, config_id).await?;
        Ok(task.id)
    }

    /// Register a target and a task for `address` and start the task. Does
    /// not wait for the scan. Nothing created along the way is removed if a
    /// later step is rejected.
    pub async fn launch(&self, address: &str, config_id: &str) -> Result<ScanTask, AgentError> {
        let target = ScanTarget::new(address, &self.settings.port_list_id)?;
        let config_id = config_id.to_string();
        let scanner_id = self.settings.scanner_id.clone();

        with_session(&*self.sessions, move |session| {
            Box::pin(async move {
                let target_name = format!(
                    "Testing Host {} {}",
                    target.address,
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f")
                );
                debug!(target = %target.address, "Creating target");
                let target_id = session
                    .create_target(&target_name, &[target.address.clone()], &target.port_scope)
                    .await?;
                require_id("create_target", &target_id)?;

                debug!(target_id = %target_id, config_id = %config_id, "Creating task");
                let task_id = session
                    .create_task(
                        &format!("Scan Host {}", target.address),
                        &config_id,
                        &target_id,
                        &scanner_id,
                    )
                    .await?;
                require_id("create_task", &task_id)?;

                let report_id = session.start_task(&task_id).await?;
                info!(
                    target = %target.address,
                    task_id = %task_id,
                    report_id = %report_id,
                    "Started scan"
                );

                Ok(ScanTask {
                    id: task_id,
                    target,
                    config: config_id,
                    scanner: scanner_id,
                    status: TaskStatus::Requested,
                })
            })
        })
        .await
    }

    /// Block until the task is reported "Done".
    ///
    /// Polls the engine's task list every poll interval, with no upper bound.
    /// Timed-out listings are logged and polled again; any other error ends
    /// the wait. Returns `false` only if `cancel` fires first.
    pub async fn wait_task(&self, task_id: &str, cancel: CancellationToken) -> Result<bool, AgentError> {
        info!(task_id = %task_id, "Waiting for task");
        let task_id = task_id.to_string();
        let interval = self.settings.poll_interval();

        with_session(&*self.sessions, move |session| {
            Box::pin(async move {
                loop {
                    if cancel.is_cancelled() {
                        info!(task_id = %task_id, "Wait cancelled");
                        return Ok(false);
                    }

                    match session.list_tasks().await {
                        Ok(tasks) => {
                            if let Some(task) = tasks.iter().find(|t| t.id == task_id) {
                                info!(
                                    task_id = %task_id,
                                    status = %task.status_text,
                                    state = ?task.status(),
                                    progress = task.progress.as_deref().unwrap_or("-"),
                                    "Scan progress"
                                );
                                if task.is_done() {
                                    return Ok(true);
                                }
                            } else {
                                debug!(task_id = %task_id, "Task not listed yet");
                            }
                        }
                        Err(e) if e.is_transient() => {
                            warn!(
                                task_id = %task_id,
                                error = %e,
                                error_type = e.classify().error_type,
                                "Task listing timed out, polling again"
                            );
                        }
                        Err(e) => return Err(e),
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(task_id = %task_id, "Wait cancelled");
                            return Ok(false);
                        }
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            })
        })
        .await
    }

    /// Number of tasks on the engine whose status is anything but "Done".
    pub async fn active_scans_count(&self) -> Result<usize, AgentError> {
        with_session(&*self.sessions, |session| {
            Box::pin(async move {
                let tasks = session.list_tasks().await?;
                Ok(tasks.iter().filter(|t| !t.is_done()).count())
            })
        })
        .await
    }
}

fn require_id(step: &str, id: &str) -> Result<(), AgentError> {
    if id.trim().is_empty() {
        return Err(AgentError::ProtocolCall(format!("{} returned an empty id", step)));
    }
    Ok(())
}
