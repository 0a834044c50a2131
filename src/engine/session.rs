use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use crate::errors::AgentError;
use crate::models::{ReportEnvelope, ReportFormat, TaskInfo};

/// An authenticated conversation with the scan engine.
///
/// Sessions are short-lived: opened for one logical operation, then closed.
/// Nothing holds a session across calls.
#[async_trait]
pub trait GmpSession: Send {
    async fn create_target(
        &mut self,
        name: &str,
        hosts: &[String],
        port_list_id: &str,
    ) -> Result<String, AgentError>;

    async fn create_task(
        &mut self,
        name: &str,
        config_id: &str,
        target_id: &str,
        scanner_id: &str,
    ) -> Result<String, AgentError>;

    /// Start a task. Returns the id of the report the run will fill.
    async fn start_task(&mut self, task_id: &str) -> Result<String, AgentError>;

    async fn list_tasks(&mut self) -> Result<Vec<TaskInfo>, AgentError>;

    async fn list_report_formats(&mut self) -> Result<Vec<ReportFormat>, AgentError>;

    /// Ids of every report the engine knows about, in listing order.
    async fn list_reports(&mut self) -> Result<Vec<String>, AgentError>;

    async fn fetch_report(
        &mut self,
        report_id: &str,
        format_id: &str,
        filter: &str,
    ) -> Result<ReportEnvelope, AgentError>;

    async fn close(&mut self) -> Result<(), AgentError>;
}

/// Opens sessions: connect plus authenticate. Any failure there is a
/// [`AgentError::Session`].
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn GmpSession>, AgentError>;
}

/// Run `op` inside a fresh session and close the session afterwards, whether
/// `op` succeeded or failed. If `op` panics the session is dropped, which
/// releases the connection.
pub async fn with_session<T, F>(factory: &dyn SessionFactory, op: F) -> Result<T, AgentError>
where
    F: for<'s> FnOnce(&'s mut dyn GmpSession) -> BoxFuture<'s, Result<T, AgentError>>,
{
    let mut session = factory.open().await?;
    let result = op(&mut *session).await;
    if let Err(e) = session.close().await {
        debug!(error = %e, "Closing engine session failed");
    }
    result
}
