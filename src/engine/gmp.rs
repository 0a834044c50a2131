//! GMP client over the gvmd Unix socket.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, warn};

use super::session::{GmpSession, SessionFactory};
use super::xml::{escape, parse_document, DocumentFramer, Element};
use crate::config::credentials::redact_credentials;
use crate::config::EngineConfig;
use crate::errors::AgentError;
use crate::models::{ReportEnvelope, ReportFormat, TaskInfo};

const READ_CHUNK: usize = 16 * 1024;

/// Opens authenticated GMP sessions against a gvmd socket.
#[derive(Debug, Clone)]
pub struct GmpConnector {
    socket_path: PathBuf,
    username: String,
    password: String,
    call_timeout: Duration,
}

impl GmpConnector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            call_timeout: config.call_timeout(),
        }
    }

    async fn connect(&self) -> Result<GmpConnection, AgentError> {
        let stream = tokio::time::timeout(self.call_timeout, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| {
                AgentError::Session(format!(
                    "Timed out connecting to {}",
                    self.socket_path.display()
                ))
            })?
            .map_err(|e| {
                AgentError::Session(format!(
                    "Failed to connect to {}: {}",
                    self.socket_path.display(),
                    e
                ))
            })?;
        Ok(GmpConnection::new(stream, self.call_timeout))
    }
}

#[async_trait]
impl SessionFactory for GmpConnector {
    async fn open(&self) -> Result<Box<dyn GmpSession>, AgentError> {
        let mut conn = self.connect().await?;

        let command = format!(
            "<authenticate><credentials><username>{}</username><password>{}</password></credentials></authenticate>",
            escape(&self.username),
            escape(&self.password),
        );
        match conn.request(&command).await {
            Ok(_) => {
                debug!(user = %self.username, "GMP session authenticated");
                Ok(Box::new(conn))
            }
            Err(e) => {
                let _ = conn.close().await;
                let reason = redact_credentials(&e.to_string(), &[&self.password]);
                Err(AgentError::Session(format!("Authentication failed: {}", reason)))
            }
        }
    }
}

pub struct GmpConnection {
    stream: UnixStream,
    call_timeout: Duration,
    buf: Vec<u8>,
    framer: DocumentFramer,
    /// Responses still owed for commands whose call timed out. They are read
    /// and discarded before the next response.
    stale_responses: usize,
    broken: bool,
}

impl GmpConnection {
    pub fn new(stream: UnixStream, call_timeout: Duration) -> Self {
        Self {
            stream,
            call_timeout,
            buf: Vec::new(),
            framer: DocumentFramer::new(),
            stale_responses: 0,
            broken: false,
        }
    }

    /// Send one command and return its response root, checking the GMP
    /// status attribute.
    pub async fn request(&mut self, command: &str) -> Result<Element, AgentError> {
        if self.broken {
            return Err(AgentError::Session("GMP connection is no longer usable".into()));
        }

        let verb = command_verb(command);

        match tokio::time::timeout(self.call_timeout, self.stream.write_all(command.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.broken = true;
                return Err(AgentError::Session(format!("{}: connection lost while writing: {}", verb, e)));
            }
            Err(_) => {
                self.broken = true;
                return Err(AgentError::Timeout(format!("{}: write timed out", verb)));
            }
        }

        let call_timeout = self.call_timeout;
        let response = match tokio::time::timeout(call_timeout, self.read_response()).await {
            Ok(response) => response?,
            Err(_) => {
                self.stale_responses += 1;
                return Err(AgentError::Timeout(format!(
                    "{}: no response within {}s",
                    verb,
                    call_timeout.as_secs()
                )));
            }
        };

        check_status(&response)?;
        Ok(response)
    }

    async fn read_response(&mut self) -> Result<Element, AgentError> {
        loop {
            let frame = self.read_frame().await?;
            if self.stale_responses == 0 {
                return parse_document(&frame);
            }
            self.stale_responses -= 1;
            debug!(bytes = frame.len(), "Discarded late GMP response");
        }
    }

    /// Read until one whole document has arrived and return its bytes.
    /// Framing state lives on the connection, so a read interrupted by the
    /// call timeout resumes where it stopped.
    async fn read_frame(&mut self) -> Result<Vec<u8>, AgentError> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            if let Some(end) = self.framer.feed(&self.buf) {
                let frame: Vec<u8> = self.buf.drain(..end).collect();
                self.framer.reset();
                return Ok(frame);
            }
            let n = match self.stream.read(&mut chunk).await {
                Ok(n) => n,
                Err(e) => {
                    self.broken = true;
                    return Err(AgentError::Session(format!("GMP read failed: {}", e)));
                }
            };
            if n == 0 {
                self.broken = true;
                return Err(AgentError::Session("gvmd closed the connection".into()));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn command_verb(command: &str) -> &str {
    command
        .trim_start_matches('<')
        .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .next()
        .unwrap_or("command")
}

fn check_status(response: &Element) -> Result<(), AgentError> {
    let status = response.attr("status").unwrap_or("");
    if status.starts_with('2') {
        return Ok(());
    }
    Err(AgentError::ProtocolCall(format!(
        "{} failed: {} {}",
        response.name,
        status,
        response.attr("status_text").unwrap_or("")
    )))
}

fn required_id(response: &Element) -> Result<String, AgentError> {
    match response.attr("id") {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(AgentError::ProtocolCall(format!("{} carried no id", response.name))),
    }
}

#[async_trait]
impl GmpSession for GmpConnection {
    async fn create_target(
        &mut self,
        name: &str,
        hosts: &[String],
        port_list_id: &str,
    ) -> Result<String, AgentError> {
        let command = format!(
            "<create_target><name>{}</name><hosts>{}</hosts><port_list id=\"{}\"/></create_target>",
            escape(name),
            escape(&hosts.join(",")),
            escape(port_list_id),
        );
        let response = self.request(&command).await?;
        required_id(&response)
    }

    async fn create_task(
        &mut self,
        name: &str,
        config_id: &str,
        target_id: &str,
        scanner_id: &str,
    ) -> Result<String, AgentError> {
        let command = format!(
            "<create_task><name>{}</name><config id=\"{}\"/><target id=\"{}\"/><scanner id=\"{}\"/></create_task>",
            escape(name),
            escape(config_id),
            escape(target_id),
            escape(scanner_id),
        );
        let response = self.request(&command).await?;
        required_id(&response)
    }

    async fn start_task(&mut self, task_id: &str) -> Result<String, AgentError> {
        let command = format!("<start_task task_id=\"{}\"/>", escape(task_id));
        let response = self.request(&command).await?;
        Ok(response.child_text("report_id").unwrap_or_default().to_string())
    }

    async fn list_tasks(&mut self) -> Result<Vec<TaskInfo>, AgentError> {
        let response = self.request("<get_tasks/>").await?;
        let tasks = response
            .children_named("task")
            .filter_map(|task| {
                let id = task.attr("id")?;
                Some(TaskInfo {
                    id: id.to_string(),
                    status_text: task.child_text("status").unwrap_or_default().to_string(),
                    progress: task.child_text("progress").map(str::to_string),
                })
            })
            .collect();
        Ok(tasks)
    }

    async fn list_report_formats(&mut self) -> Result<Vec<ReportFormat>, AgentError> {
        let response = self.request("<get_report_formats/>").await?;
        let formats = response
            .children_named("report_format")
            .filter_map(|format| {
                let id = format.attr("id")?;
                let name = format.child_text("name")?;
                Some(ReportFormat::new(id, name))
            })
            .collect();
        Ok(formats)
    }

    async fn list_reports(&mut self) -> Result<Vec<String>, AgentError> {
        let response = self.request("<get_reports/>").await?;
        let ids = response
            .children_named("report")
            .filter_map(|report| report.attr("id").map(str::to_string))
            .collect();
        Ok(ids)
    }

    async fn fetch_report(
        &mut self,
        report_id: &str,
        format_id: &str,
        filter: &str,
    ) -> Result<ReportEnvelope, AgentError> {
        let command = format!(
            "<get_reports report_id=\"{}\" format_id=\"{}\" filter=\"{}\" details=\"1\"/>",
            escape(report_id),
            escape(format_id),
            escape(filter),
        );
        let response = self.request(&command).await?;
        let report = response.child("report").ok_or_else(|| {
            AgentError::ProtocolCall(format!("get_reports returned no report for {}", report_id))
        })?;

        // The payload is the text that follows the report_format element.
        let content = match report.child("report_format") {
            Some(_) if !report.text.is_empty() => Some(report.text.clone()),
            _ => None,
        };

        Ok(ReportEnvelope {
            report_id: report.attr("id").unwrap_or(report_id).to_string(),
            content,
        })
    }

    async fn close(&mut self) -> Result<(), AgentError> {
        if let Err(e) = self.stream.shutdown().await {
            warn!(error = %e, "GMP socket shutdown failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_verb() {
        assert_eq!(command_verb("<get_tasks/>"), "get_tasks");
        assert_eq!(command_verb("<start_task task_id=\"x\"/>"), "start_task");
        assert_eq!(command_verb("<authenticate><credentials>"), "authenticate");
    }

    #[test]
    fn test_check_status() {
        let ok = Element {
            name: "create_task_response".into(),
            attrs: vec![("status".into(), "201".into())],
            ..Default::default()
        };
        assert!(check_status(&ok).is_ok());

        let rejected = Element {
            name: "create_task_response".into(),
            attrs: vec![
                ("status".into(), "400".into()),
                ("status_text".into(), "Failed to find config".into()),
            ],
            ..Default::default()
        };
        let err = check_status(&rejected).unwrap_err();
        assert!(matches!(err, AgentError::ProtocolCall(_)));
        assert!(err.to_string().contains("Failed to find config"));
    }

    #[test]
    fn test_required_id() {
        let missing = Element {
            name: "create_target_response".into(),
            attrs: vec![("status".into(), "201".into()), ("id".into(), String::new())],
            ..Default::default()
        };
        assert!(required_id(&missing).is_err());
    }
}
