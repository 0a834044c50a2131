use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// "Full and fast" scan configuration from the engine's catalog.
pub const DEFAULT_SCAN_CONFIG_ID: &str = "daba56c8-73ec-11df-a475-002264764cea";
/// "All IANA assigned TCP and UDP" port list.
pub const ALL_IANA_TCP_UDP_PORT_LIST_ID: &str = "4a4717fe-57d2-11e1-9a26-406186ea4fc5";
/// Built-in OpenVAS scanner.
pub const OPENVAS_SCANNER_ID: &str = "08b69003-5fc2-4037-a479-93b440211c73";

pub const DEFAULT_GVMD_LOG: &str = "/usr/local/var/log/gvm/gvmd.log";
pub const VT_UPDATE_DONE_MARKER: &str = "Updating VTs in database ... done";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    pub engine: EngineConfig,
    pub scan: ScanSettings,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// gvmd management socket.
    pub socket_path: PathBuf,
    pub username: String,
    /// Literal password, or `$VAR` to read it from the environment.
    pub password: String,
    /// Upper bound for a single protocol call, connect included.
    pub call_timeout_secs: u64,
    /// gvmd log scanned for the feed-update marker.
    pub log_file: PathBuf,
    pub ready_marker: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/run/gvmd/gvmd.sock"),
            username: "admin".to_string(),
            password: "admin".to_string(),
            call_timeout_secs: 60,
            log_file: PathBuf::from(DEFAULT_GVMD_LOG),
            ready_marker: VT_UPDATE_DONE_MARKER.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Scan profile used when a request does not name one.
    pub config_id: String,
    pub port_list_id: String,
    pub scanner_id: String,
    pub poll_interval_secs: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            config_id: DEFAULT_SCAN_CONFIG_ID.to_string(),
            port_list_id: ALL_IANA_TCP_UDP_PORT_LIST_ID.to_string(),
            scanner_id: OPENVAS_SCANNER_ID.to_string(),
            poll_interval_secs: 30,
        }
    }
}

impl ScanSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Agent kind reported when asking the backend for targets.
    pub docker_type: u32,
    /// Pull targets from the backend and scan them while the engine is online.
    pub target_intake: bool,
    pub metrics_interval_secs: u64,
    pub results_interval_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://panel.hunterbounter.com".to_string(),
            docker_type: 2,
            target_intake: true,
            metrics_interval_secs: 10,
            results_interval_secs: 15,
        }
    }
}

impl BackendConfig {
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    pub fn results_interval(&self) -> Duration {
        Duration::from_secs(self.results_interval_secs)
    }
}
