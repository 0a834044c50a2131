use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

static HOST_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("host label pattern")
});

/// Engine status text that marks a task as finished.
pub const STATUS_DONE: &str = "Done";

/// A host handed to the engine for one scan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanTarget {
    pub address: String,
    pub port_scope: String,
}

impl ScanTarget {
    /// Validate `address` (IP literal, CIDR block or DNS hostname) and bind it
    /// to a port list.
    pub fn new(address: &str, port_scope: &str) -> Result<Self, AgentError> {
        let address = address.trim();
        if !is_valid_address(address) {
            return Err(AgentError::InvalidTarget(format!(
                "'{}' is not an IP address or hostname",
                address
            )));
        }
        Ok(Self {
            address: address.to_string(),
            port_scope: port_scope.to_string(),
        })
    }
}

fn is_valid_address(address: &str) -> bool {
    if address.is_empty() {
        return false;
    }
    if address.parse::<IpAddr>().is_ok() {
        return true;
    }
    if let Some((ip, prefix)) = address.split_once('/') {
        return match (ip.parse::<IpAddr>(), prefix.parse::<u8>()) {
            (Ok(IpAddr::V4(_)), Ok(p)) => p <= 32,
            (Ok(IpAddr::V6(_)), Ok(p)) => p <= 128,
            _ => false,
        };
    }
    let host = address.strip_suffix('.').unwrap_or(address);
    host.len() <= 253 && host.split('.').all(|label| HOST_LABEL.is_match(label))
}

/// Task lifecycle as last observed on the engine. Never cached; every poll
/// re-derives it from the engine's status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Requested,
    Running,
    Done,
    Unknown,
}

impl TaskStatus {
    pub fn from_engine(text: &str) -> Self {
        match text {
            STATUS_DONE => Self::Done,
            "New" | "Requested" | "Queued" => Self::Requested,
            "Running" => Self::Running,
            _ => Self::Unknown,
        }
    }
}

/// A task registered with the engine by this agent.
#[derive(Debug, Clone, Serialize)]
pub struct ScanTask {
    pub id: String,
    pub target: ScanTarget,
    pub config: String,
    pub scanner: String,
    pub status: TaskStatus,
}

/// One entry of the engine's task listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: String,
    pub status_text: String,
    pub progress: Option<String>,
}

impl TaskInfo {
    pub fn is_done(&self) -> bool {
        self.status() == TaskStatus::Done
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_engine(&self.status_text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormatKind {
    /// Header-plus-rows table ("CSV Results").
    StructuredTable,
    /// The engine's native markup ("XML").
    RawMarkup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFormat {
    pub id: String,
    pub name: String,
}

impl ReportFormat {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> Option<ReportFormatKind> {
        if self.name.starts_with("CSV Results") {
            Some(ReportFormatKind::StructuredTable)
        } else if self.name == "XML" {
            Some(ReportFormatKind::RawMarkup)
        } else {
            None
        }
    }
}

/// A fetched report: the envelope id plus the base64 payload embedded in it,
/// if the engine attached one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEnvelope {
    pub report_id: String,
    pub content: Option<String>,
}
