//! Engine readiness.
//!
//! Before the engine has ever been seen ready, readiness is read from the
//! gvmd log: the feed-update completion marker means the engine is usable.
//! Once that marker has been seen the latch stays set for the life of the
//! process and only a live authenticated session counts from then on.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::engine::{with_session, SessionFactory};

/// Outcome of a readiness check.
///
/// `NotReady` is a definite answer; `Unknown` means the check itself failed
/// (engine unreachable, authentication refused, ...). Callers that only need
/// a yes/no treat both as not ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady(String),
    Unknown(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

pub struct ReadinessMonitor {
    sessions: Arc<dyn SessionFactory>,
    log_file: PathBuf,
    marker: String,
    confirmed_ready: AtomicBool,
}

impl ReadinessMonitor {
    pub fn new(sessions: Arc<dyn SessionFactory>, log_file: PathBuf, marker: String) -> Self {
        Self {
            sessions,
            log_file,
            marker,
            confirmed_ready: AtomicBool::new(false),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_ready.load(Ordering::Acquire)
    }

    pub async fn is_ready(&self) -> bool {
        self.check().await.is_ready()
    }

    pub async fn check(&self) -> Readiness {
        if self.is_confirmed() {
            return self.live_check().await;
        }

        let readiness = self.check_log_marker().await;
        if readiness.is_ready() {
            // false -> true only; concurrent writers store the same value.
            self.confirmed_ready.store(true, Ordering::Release);
            info!(log = %self.log_file.display(), "Engine feed update complete");
        }
        readiness
    }

    async fn check_log_marker(&self) -> Readiness {
        let file = match File::open(&self.log_file).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(log = %self.log_file.display(), "Engine log file does not exist");
                return Readiness::NotReady("engine log file missing".into());
            }
            Err(e) => {
                info!(log = %self.log_file.display(), error = %e, "Failed to read engine log file");
                return Readiness::NotReady(format!("engine log unreadable: {}", e));
            }
        };

        let marker = self.marker.as_bytes();
        if marker.is_empty() {
            return Readiness::NotReady("feed update still running".into());
        }

        // Raw byte lines: gvmd logs are not guaranteed to be valid UTF-8.
        let mut lines = BufReader::new(file).split(b'\n');
        loop {
            match lines.next_segment().await {
                Ok(Some(line)) => {
                    if line.windows(marker.len()).any(|window| window == marker) {
                        return Readiness::Ready;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    info!(log = %self.log_file.display(), error = %e, "Failed to read engine log file");
                    return Readiness::NotReady(format!("engine log unreadable: {}", e));
                }
            }
        }

        info!("VTs are not updated yet");
        Readiness::NotReady("feed update still running".into())
    }

    async fn live_check(&self) -> Readiness {
        let attempt = with_session(&*self.sessions, |_session| Box::pin(async { Ok(()) }));
        match std::panic::AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(Ok(())) => Readiness::Ready,
            Ok(Err(e)) => {
                info!(error = %e, "Failed to connect to OpenVAS");
                Readiness::Unknown(e.to_string())
            }
            Err(_) => {
                debug!("Readiness check panicked");
                Readiness::Unknown("readiness check panicked".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VT_UPDATE_DONE_MARKER;
    use crate::engine::MockEngine;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn monitor(engine: &MockEngine, log_file: PathBuf) -> ReadinessMonitor {
        ReadinessMonitor::new(
            Arc::new(engine.clone()),
            log_file,
            VT_UPDATE_DONE_MARKER.to_string(),
        )
    }

    fn log_with(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_missing_log_is_not_ready() {
        let engine = MockEngine::new();
        let monitor = monitor(&engine, PathBuf::from("/nonexistent/gvmd.log"));
        let readiness = monitor.check().await;
        assert!(matches!(readiness, Readiness::NotReady(_)));
        assert!(!monitor.is_confirmed());
        // The cheap path never touches the engine.
        assert_eq!(engine.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_log_without_marker_is_not_ready() {
        let engine = MockEngine::new();
        let log = log_with(&["md   main:MESSAGE:2024-01-01 Updating VTs in database ..."]);
        let monitor = monitor(&engine, log.path().to_path_buf());
        assert!(!monitor.is_ready().await);
        assert!(!monitor.is_confirmed());
    }

    #[tokio::test]
    async fn test_marker_sets_latch() {
        let engine = MockEngine::new().refusing_sessions();
        let log = log_with(&[
            "md manage: starting",
            "md   main:MESSAGE:2024-01-01 12h00.00 UTC:17: Updating VTs in database ... done (95000 VTs).",
        ]);
        let monitor = monitor(&engine, log.path().to_path_buf());
        // Marker found: ready without any live session.
        assert!(monitor.is_ready().await);
        assert!(monitor.is_confirmed());
        assert_eq!(engine.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_marker_found_deep_in_non_utf8_log() {
        let engine = MockEngine::new();
        let mut log = NamedTempFile::new().unwrap();
        for i in 0..50_000 {
            writeln!(log, "md manage:   INFO:2024-01-01 {}: Updating NVT cache", i).unwrap();
        }
        log.write_all(b"md manage: \xff\xfe garbled bytes\n").unwrap();
        writeln!(log, "md main: Updating VTs in database ... done (95000 VTs).").unwrap();
        log.flush().unwrap();

        let monitor = monitor(&engine, log.path().to_path_buf());
        assert!(monitor.is_ready().await);
        assert!(monitor.is_confirmed());
    }

    #[tokio::test]
    async fn test_latched_monitor_checks_live() {
        let engine = MockEngine::new();
        let log = log_with(&["Updating VTs in database ... done"]);
        let monitor = monitor(&engine, log.path().to_path_buf());
        assert!(monitor.is_ready().await);

        // Log rotated away: the latch means the live session decides.
        drop(log);
        assert!(monitor.is_ready().await);
        assert_eq!(engine.sessions_opened(), 1);
        assert_eq!(engine.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_latched_monitor_reports_unknown_when_session_fails() {
        let engine = MockEngine::new();
        let log = log_with(&["Updating VTs in database ... done"]);
        let monitor = monitor(&engine, log.path().to_path_buf());
        assert!(monitor.is_ready().await);

        engine.set_refuse_sessions(true);
        let readiness = monitor.check().await;
        assert!(matches!(readiness, Readiness::Unknown(_)));
        assert!(!readiness.is_ready());
        // The latch never goes back.
        assert!(monitor.is_confirmed());

        engine.set_refuse_sessions(false);
        assert!(monitor.is_ready().await);
    }
}
