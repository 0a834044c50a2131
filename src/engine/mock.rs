//! In-memory scan engine for tests.
//!
//! `MockEngine` implements [`SessionFactory`] and serves scripted answers:
//! report formats, reports with their CSV bodies, per-task status sequences,
//! and injected failures for individual protocol calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::session::{GmpSession, SessionFactory};
use crate::errors::AgentError;
use crate::models::{ReportEnvelope, ReportFormat, TaskInfo};

/// Protocol calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    CreateTarget,
    CreateTask,
    StartTask,
    ListTasks,
    ListReportFormats,
    ListReports,
    FetchReport,
}

#[derive(Debug, Clone)]
enum MockReport {
    Payload(String),
    Missing,
    Rejected,
}

/// A target registered through the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTarget {
    pub name: String,
    pub hosts: Vec<String>,
    pub port_list_id: String,
}

/// A task registered through the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTask {
    pub id: String,
    pub name: String,
    pub config_id: String,
    pub target_id: String,
    pub scanner_id: String,
}

#[derive(Debug, Default)]
struct MockState {
    refuse_sessions: bool,
    formats: Vec<ReportFormat>,
    reports: Vec<(String, MockReport)>,
    /// Status sequence per task; the last entry repeats once reached.
    tasks: Vec<(String, VecDeque<String>)>,
    failing: HashSet<MockCall>,
    list_task_timeouts: u32,
    blank_ids: bool,
    targets: Vec<CreatedTarget>,
    created_tasks: Vec<CreatedTask>,
    started: Vec<String>,
    report_fetches: Vec<(String, String, String)>,
    calls: HashMap<MockCall, u32>,
    sessions_opened: u32,
    sessions_closed: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every `open` fails as if gvmd were down.
    pub fn refusing_sessions(self) -> Self {
        self.lock().refuse_sessions = true;
        self
    }

    pub fn set_refuse_sessions(&self, refuse: bool) {
        self.lock().refuse_sessions = refuse;
    }

    pub fn with_format(self, id: &str, name: &str) -> Self {
        self.lock().formats.push(ReportFormat::new(id, name));
        self
    }

    /// Add a report whose payload is `csv`, base64-encoded as gvmd sends it.
    pub fn with_csv_report(self, report_id: &str, csv: &str) -> Self {
        let payload = STANDARD.encode(csv.as_bytes());
        self.lock().reports.push((report_id.to_string(), MockReport::Payload(payload)));
        self
    }

    /// Add a report with an arbitrary (possibly invalid) payload.
    pub fn with_raw_report(self, report_id: &str, payload: &str) -> Self {
        self.lock().reports.push((report_id.to_string(), MockReport::Payload(payload.to_string())));
        self
    }

    /// Add a report whose envelope carries no payload.
    pub fn with_empty_report(self, report_id: &str) -> Self {
        self.lock().reports.push((report_id.to_string(), MockReport::Missing));
        self
    }

    /// Add a report that the engine refuses to return.
    pub fn with_rejected_report(self, report_id: &str) -> Self {
        self.lock().reports.push((report_id.to_string(), MockReport::Rejected));
        self
    }

    /// Add an existing task that walks through `statuses`, one per listing.
    pub fn with_task(self, task_id: &str, statuses: &[&str]) -> Self {
        let sequence = statuses.iter().map(|s| s.to_string()).collect();
        self.lock().tasks.push((task_id.to_string(), sequence));
        self
    }

    pub fn failing(self, call: MockCall) -> Self {
        self.lock().failing.insert(call);
        self
    }

    /// The next `count` task listings time out.
    pub fn with_list_task_timeouts(self, count: u32) -> Self {
        self.lock().list_task_timeouts = count;
        self
    }

    /// Create calls succeed but return an empty id.
    pub fn with_blank_ids(self) -> Self {
        self.lock().blank_ids = true;
        self
    }

    pub fn targets(&self) -> Vec<CreatedTarget> {
        self.lock().targets.clone()
    }

    pub fn created_tasks(&self) -> Vec<CreatedTask> {
        self.lock().created_tasks.clone()
    }

    pub fn started_tasks(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    /// `(report_id, format_id, filter)` for every fetch.
    pub fn report_fetches(&self) -> Vec<(String, String, String)> {
        self.lock().report_fetches.clone()
    }

    pub fn call_count(&self, call: MockCall) -> u32 {
        self.lock().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn sessions_opened(&self) -> u32 {
        self.lock().sessions_opened
    }

    pub fn sessions_closed(&self) -> u32 {
        self.lock().sessions_closed
    }
}

#[async_trait]
impl SessionFactory for MockEngine {
    async fn open(&self) -> Result<Box<dyn GmpSession>, AgentError> {
        let mut state = self.lock();
        if state.refuse_sessions {
            return Err(AgentError::Session("mock engine refused the connection".into()));
        }
        state.sessions_opened += 1;
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn enter(&self, call: MockCall) -> Result<MutexGuard<'_, MockState>, AgentError> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state.calls.entry(call).or_insert(0) += 1;
        if state.failing.contains(&call) {
            return Err(AgentError::ProtocolCall(format!("mock engine rejected {:?}", call)));
        }
        Ok(state)
    }
}

#[async_trait]
impl GmpSession for MockSession {
    async fn create_target(
        &mut self,
        name: &str,
        hosts: &[String],
        port_list_id: &str,
    ) -> Result<String, AgentError> {
        let mut state = self.enter(MockCall::CreateTarget)?;
        state.targets.push(CreatedTarget {
            name: name.to_string(),
            hosts: hosts.to_vec(),
            port_list_id: port_list_id.to_string(),
        });
        if state.blank_ids {
            return Ok(String::new());
        }
        Ok(format!("target-{}", state.targets.len()))
    }

    async fn create_task(
        &mut self,
        name: &str,
        config_id: &str,
        target_id: &str,
        scanner_id: &str,
    ) -> Result<String, AgentError> {
        let mut state = self.enter(MockCall::CreateTask)?;
        let id = if state.blank_ids {
            String::new()
        } else {
            format!("task-{}", state.created_tasks.len() + 1)
        };
        state.created_tasks.push(CreatedTask {
            id: id.clone(),
            name: name.to_string(),
            config_id: config_id.to_string(),
            target_id: target_id.to_string(),
            scanner_id: scanner_id.to_string(),
        });
        state.tasks.push((id.clone(), VecDeque::from(["New".to_string()])));
        Ok(id)
    }

    async fn start_task(&mut self, task_id: &str) -> Result<String, AgentError> {
        let mut state = self.enter(MockCall::StartTask)?;
        state.started.push(task_id.to_string());
        Ok(format!("report-for-{}", task_id))
    }

    async fn list_tasks(&mut self) -> Result<Vec<TaskInfo>, AgentError> {
        let mut state = self.enter(MockCall::ListTasks)?;
        if state.list_task_timeouts > 0 {
            state.list_task_timeouts -= 1;
            return Err(AgentError::Timeout("get_tasks: mock timeout".into()));
        }
        let tasks = state
            .tasks
            .iter_mut()
            .map(|(id, statuses)| {
                let status = if statuses.len() > 1 {
                    statuses.pop_front().unwrap_or_default()
                } else {
                    statuses.front().cloned().unwrap_or_default()
                };
                TaskInfo {
                    id: id.clone(),
                    status_text: status,
                    progress: Some("-1".to_string()),
                }
            })
            .collect();
        Ok(tasks)
    }

    async fn list_report_formats(&mut self) -> Result<Vec<ReportFormat>, AgentError> {
        let state = self.enter(MockCall::ListReportFormats)?;
        Ok(state.formats.clone())
    }

    async fn list_reports(&mut self) -> Result<Vec<String>, AgentError> {
        let state = self.enter(MockCall::ListReports)?;
        Ok(state.reports.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn fetch_report(
        &mut self,
        report_id: &str,
        format_id: &str,
        filter: &str,
    ) -> Result<ReportEnvelope, AgentError> {
        let mut state = self.enter(MockCall::FetchReport)?;
        state
            .report_fetches
            .push((report_id.to_string(), format_id.to_string(), filter.to_string()));
        let report = state
            .reports
            .iter()
            .find(|(id, _)| id == report_id)
            .map(|(_, report)| report.clone());
        match report {
            Some(MockReport::Payload(payload)) => Ok(ReportEnvelope {
                report_id: report_id.to_string(),
                content: Some(payload),
            }),
            Some(MockReport::Missing) => Ok(ReportEnvelope {
                report_id: report_id.to_string(),
                content: None,
            }),
            Some(MockReport::Rejected) | None => Err(AgentError::ProtocolCall(format!(
                "get_reports failed: 404 Failed to find report '{}'",
                report_id
            ))),
        }
    }

    async fn close(&mut self) -> Result<(), AgentError> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.sessions_closed += 1;
        Ok(())
    }
}
