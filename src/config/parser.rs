use std::path::Path;
use crate::errors::AgentError;
use super::credentials::resolve_credential;
use super::types::AgentConfig;
use super::schema::CONFIG_SCHEMA;
use tracing::{info, warn};

/// Load the agent configuration, falling back to built-in defaults when no
/// file is given.
pub async fn load_config(path: Option<&Path>) -> Result<AgentConfig, AgentError> {
    let mut config = match path {
        Some(path) => parse_config(path).await?,
        None => {
            info!("No config file given, using defaults");
            AgentConfig::default()
        }
    };
    config.engine.password = resolve_credential(&config.engine.password)?;
    Ok(config)
}

pub async fn parse_config(path: &Path) -> Result<AgentConfig, AgentError> {
    if !path.exists() {
        return Err(AgentError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(AgentError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<AgentConfig, AgentError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;

    // An empty file parses to null; treat it as "all defaults".
    if yaml.is_null() {
        return Ok(AgentConfig::default());
    }

    validate_schema(&yaml)?;

    let config: AgentConfig = serde_yaml::from_value(yaml)?;

    validate_semantics(&config)?;

    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), AgentError> {
    let json_value: serde_json::Value = serde_json::to_value(yaml)
        .map_err(|e| AgentError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| AgentError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        // Advisory only; typed parsing and the semantic pass decide.
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

fn validate_semantics(config: &AgentConfig) -> Result<(), AgentError> {
    let ids = [
        ("scan.config_id", &config.scan.config_id),
        ("scan.port_list_id", &config.scan.port_list_id),
        ("scan.scanner_id", &config.scan.scanner_id),
    ];
    for (key, value) in ids {
        if value.trim().is_empty() {
            return Err(AgentError::Config(format!("{} must not be empty", key)));
        }
    }

    let intervals = [
        ("engine.call_timeout_secs", config.engine.call_timeout_secs),
        ("scan.poll_interval_secs", config.scan.poll_interval_secs),
        ("backend.metrics_interval_secs", config.backend.metrics_interval_secs),
        ("backend.results_interval_secs", config.backend.results_interval_secs),
    ];
    for (key, value) in intervals {
        if value == 0 {
            return Err(AgentError::Config(format!("{} must be greater than zero", key)));
        }
    }

    let url = &config.backend.base_url;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AgentError::Config(format!(
            "backend.base_url must be an http(s) URL, got '{}'",
            url
        )));
    }

    if config.engine.ready_marker.is_empty() {
        return Err(AgentError::Config("engine.ready_marker must not be empty".into()));
    }

    if config.engine.username.is_empty() {
        warn!("engine.username is empty, authentication will likely fail");
    }

    Ok(())
}
