use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use openvas_agent::config::{EngineConfig, ScanSettings, DEFAULT_SCAN_CONFIG_ID};
use openvas_agent::engine::GmpConnector;
use openvas_agent::errors::AgentError;
use openvas_agent::reporting::ReportNormalizer;
use openvas_agent::scan::ScanOrchestrator;

const PASSWORD: &str = "s3cret-pass";
const REPORT_CSV: &str = "IP,Hostname,Port,Severity,NVT Name\n10.1.1.4,web,443/tcp,7.5,Weak TLS\n";

const RUNNING_LISTING: &str = concat!(
    r#"<get_tasks_response status="200" status_text="OK">"#,
    r#"<task id="task-9"><name>Scan Host 10.1.1.4</name><status>Running</status><progress>97</progress></task>"#,
    r#"</get_tasks_response>"#
);

#[derive(Clone, Default)]
struct FakeGvmd {
    commands: Arc<Mutex<Vec<String>>>,
    /// Verbs the daemon reads but never answers.
    silent: Vec<&'static str>,
    /// Send each response in two halves.
    split_writes: bool,
    /// Answer the first `get_tasks` only after this delay, with the task
    /// still running.
    late_first_listing: Option<Duration>,
    /// Verbs answered with a document carrying an undefined entity.
    garbled: Vec<&'static str>,
}

impl FakeGvmd {
    fn start(self, dir: &Path) -> PathBuf {
        let path = dir.join("gvmd.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { return };
                tokio::spawn(self.clone().serve(stream));
            }
        });
        path
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    async fn serve(self, mut stream: UnixStream) {
        let mut buf = String::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
            let Some(command) = complete_command(&buf) else { continue };
            buf.clear();
            self.commands.lock().unwrap().push(command.clone());

            let verb = verb(&command);
            if self.silent.contains(&verb.as_str()) {
                continue;
            }
            let listings = self.commands().iter().filter(|c| c.starts_with("<get_tasks")).count();
            let response = match self.late_first_listing {
                Some(delay) if verb == "get_tasks" && listings == 1 => {
                    tokio::time::sleep(delay).await;
                    RUNNING_LISTING.to_string()
                }
                _ if self.garbled.contains(&verb.as_str()) => {
                    format!(r#"<{}_response status="200" status_text="OK">&bogus;</{}_response>"#, verb, verb)
                }
                _ => respond(&verb, &command),
            };
            if self.split_writes {
                let (head, tail) = response.split_at(response.len() / 2);
                stream.write_all(head.as_bytes()).await.unwrap();
                stream.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                stream.write_all(tail.as_bytes()).await.unwrap();
            } else {
                stream.write_all(response.as_bytes()).await.unwrap();
            }
        }
    }
}

fn verb(command: &str) -> String {
    command
        .trim_start_matches('<')
        .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn complete_command(buf: &str) -> Option<String> {
    let verb = verb(buf);
    let closing = format!("</{}>", verb);
    let self_closed = buf.ends_with("/>") && buf.matches('<').count() == 1;
    if self_closed || buf.ends_with(&closing) {
        Some(buf.to_string())
    } else {
        None
    }
}

fn respond(verb: &str, command: &str) -> String {
    match verb {
        "authenticate" if command.contains(PASSWORD) => {
            r#"<authenticate_response status="200" status_text="OK"><role>Admin</role></authenticate_response>"#.into()
        }
        "authenticate" => {
            r#"<authenticate_response status="400" status_text="Authentication failed"/>"#.into()
        }
        "create_target" => {
            r#"<create_target_response status="201" status_text="OK, resource created" id="tgt-1"/>"#.into()
        }
        "create_task" => {
            r#"<create_task_response status="201" status_text="OK, resource created" id="task-9"/>"#.into()
        }
        "start_task" => {
            r#"<start_task_response status="202" status_text="OK, request submitted"><report_id>rep-1</report_id></start_task_response>"#.into()
        }
        "get_tasks" => concat!(
            r#"<get_tasks_response status="200" status_text="OK">"#,
            r#"<task id="task-9"><name>Scan Host 10.1.1.4</name><status>Done</status><progress>-1</progress></task>"#,
            r#"<task id="task-10"><name>Scan Host 10.1.1.5</name><status>Running</status><progress>42</progress></task>"#,
            r#"</get_tasks_response>"#
        )
        .into(),
        "get_report_formats" => concat!(
            r#"<get_report_formats_response status="200" status_text="OK">"#,
            r#"<report_format id="fmt-xml"><name>XML</name></report_format>"#,
            r#"<report_format id="fmt-csv"><name>CSV Results</name></report_format>"#,
            r#"</get_report_formats_response>"#
        )
        .into(),
        "get_reports" if command.contains("report_id=") => format!(
            r#"<get_reports_response status="200" status_text="OK"><report id="rep-1" format_id="fmt-csv" extension="csv" content_type="text/csv"><report_format id="fmt-csv"><name>CSV Results</name></report_format>{}</report></get_reports_response>"#,
            STANDARD.encode(REPORT_CSV)
        ),
        "get_reports" => {
            r#"<get_reports_response status="200" status_text="OK"><report id="rep-1"/></get_reports_response>"#.into()
        }
        _ => format!(r#"<{}_response status="400" status_text="Unknown command"/>"#, verb),
    }
}

fn engine_config(socket_path: PathBuf, password: &str) -> EngineConfig {
    EngineConfig {
        socket_path,
        password: password.to_string(),
        call_timeout_secs: 1,
        ..EngineConfig::default()
    }
}

fn settings() -> ScanSettings {
    ScanSettings {
        poll_interval_secs: 0,
        ..ScanSettings::default()
    }
}

#[tokio::test]
async fn test_start_scan_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let gvmd = FakeGvmd::default();
    let socket = gvmd.clone().start(dir.path());

    let sessions = Arc::new(GmpConnector::new(&engine_config(socket, PASSWORD)));
    let orchestrator = ScanOrchestrator::new(sessions, settings());

    let task_id = orchestrator
        .start_scan("10.1.1.4", DEFAULT_SCAN_CONFIG_ID)
        .await
        .unwrap();
    assert_eq!(task_id, "task-9");

    let commands = gvmd.commands();
    let verbs: Vec<String> = commands.iter().map(|c| verb(c)).collect();
    assert_eq!(verbs, vec!["authenticate", "create_target", "create_task", "start_task"]);
    assert!(commands[1].contains("<hosts>10.1.1.4</hosts>"));
    assert!(commands[2].contains(r#"<target id="tgt-1"/>"#));
    assert!(commands[2].contains(DEFAULT_SCAN_CONFIG_ID));
    assert!(commands[3].contains(r#"task_id="task-9""#));
}

#[tokio::test]
async fn test_wait_and_count_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = FakeGvmd::default().start(dir.path());

    let sessions = Arc::new(GmpConnector::new(&engine_config(socket, PASSWORD)));
    let orchestrator = ScanOrchestrator::new(sessions, settings());

    let done = orchestrator
        .wait_task("task-9", CancellationToken::new())
        .await
        .unwrap();
    assert!(done);
    assert_eq!(orchestrator.active_scans_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_results_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let gvmd = FakeGvmd::default();
    let socket = gvmd.clone().start(dir.path());

    let normalizer = ReportNormalizer::new(Arc::new(GmpConnector::new(&engine_config(socket, PASSWORD))));
    let results = normalizer.get_results().await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].report_id, "rep-1");
    assert_eq!(results[0].get("NVT Name"), Some("Weak TLS"));
    assert_eq!(results[0].get("Port"), Some("443/tcp"));

    let fetch = gvmd
        .commands()
        .into_iter()
        .find(|c| c.contains("report_id="))
        .unwrap();
    assert!(fetch.contains(r#"format_id="fmt-csv""#));
    assert!(fetch.contains("min_qod=70"));
}

#[tokio::test]
async fn test_split_responses_are_reassembled() {
    let dir = tempfile::tempdir().unwrap();
    let gvmd = FakeGvmd {
        split_writes: true,
        ..FakeGvmd::default()
    };
    let socket = gvmd.start(dir.path());

    let orchestrator = ScanOrchestrator::new(
        Arc::new(GmpConnector::new(&engine_config(socket, PASSWORD))),
        settings(),
    );
    assert_eq!(orchestrator.active_scans_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bad_credentials_are_redacted() {
    let dir = tempfile::tempdir().unwrap();
    let socket = FakeGvmd::default().start(dir.path());

    let wrong = "hunter2-wrong";
    let orchestrator = ScanOrchestrator::new(
        Arc::new(GmpConnector::new(&engine_config(socket, wrong))),
        settings(),
    );
    let err = orchestrator.active_scans_count().await.unwrap_err();
    assert!(matches!(err, AgentError::Session(_)));
    assert!(err.to_string().contains("Authentication failed"));
    assert!(!err.to_string().contains(wrong));
}

#[tokio::test]
async fn test_missing_socket() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = ScanOrchestrator::new(
        Arc::new(GmpConnector::new(&engine_config(dir.path().join("absent.sock"), PASSWORD))),
        settings(),
    );
    let err = orchestrator.active_scans_count().await.unwrap_err();
    assert!(matches!(err, AgentError::Session(_)));
}

#[tokio::test]
async fn test_unanswered_call_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let gvmd = FakeGvmd {
        silent: vec!["get_tasks"],
        ..FakeGvmd::default()
    };
    let socket = gvmd.start(dir.path());

    let orchestrator = ScanOrchestrator::new(
        Arc::new(GmpConnector::new(&engine_config(socket, PASSWORD))),
        settings(),
    );
    let err = orchestrator.active_scans_count().await.unwrap_err();
    assert!(matches!(err, AgentError::Timeout(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_late_listing_is_discarded_and_wait_completes() {
    let dir = tempfile::tempdir().unwrap();
    let gvmd = FakeGvmd {
        late_first_listing: Some(Duration::from_millis(1500)),
        ..FakeGvmd::default()
    };
    let socket = gvmd.clone().start(dir.path());

    let orchestrator = ScanOrchestrator::new(
        Arc::new(GmpConnector::new(&engine_config(socket, PASSWORD))),
        settings(),
    );

    // The first listing times out after 1s; its "Running" answer arrives
    // late and must not be taken as the reply to the second listing.
    let done = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.wait_task("task-9", CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(done);

    let listings = gvmd.commands().iter().filter(|c| verb(c) == "get_tasks").count();
    assert_eq!(listings, 2);
}

#[tokio::test]
async fn test_malformed_response_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let gvmd = FakeGvmd {
        garbled: vec!["get_tasks"],
        ..FakeGvmd::default()
    };
    let socket = gvmd.start(dir.path());

    let orchestrator = ScanOrchestrator::new(
        Arc::new(GmpConnector::new(&engine_config(socket, PASSWORD))),
        settings(),
    );

    let started = std::time::Instant::now();
    let err = orchestrator
        .wait_task("task-9", CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ProtocolCall(_)));
    assert!(!err.is_transient());
    assert!(started.elapsed() < Duration::from_secs(1));
}
