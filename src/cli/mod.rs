pub mod commands;
pub mod scan;
pub mod serve;
pub mod status;

pub use commands::{Cli, Commands};

use std::path::PathBuf;
use std::sync::Arc;
use crate::config::{load_config, AgentConfig};
use crate::engine::{GmpConnector, SessionFactory};
use crate::errors::AgentError;

/// Load the config named by `--config`, or the defaults.
pub async fn resolve_config(path: Option<&str>) -> Result<AgentConfig, AgentError> {
    let path = path.map(PathBuf::from);
    load_config(path.as_deref()).await
}

pub fn engine_sessions(config: &AgentConfig) -> Arc<dyn SessionFactory> {
    Arc::new(GmpConnector::new(&config.engine))
}
