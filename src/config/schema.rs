use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "engine": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "socket_path": { "type": "string" },
                    "username": { "type": "string" },
                    "password": { "type": "string" },
                    "call_timeout_secs": { "type": "integer", "minimum": 1 },
                    "log_file": { "type": "string" },
                    "ready_marker": { "type": "string", "minLength": 1 }
                }
            },
            "scan": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "config_id": { "$ref": "#/$defs/uuid" },
                    "port_list_id": { "$ref": "#/$defs/uuid" },
                    "scanner_id": { "$ref": "#/$defs/uuid" },
                    "poll_interval_secs": { "type": "integer", "minimum": 1 }
                }
            },
            "backend": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "base_url": { "type": "string", "format": "uri" },
                    "docker_type": { "type": "integer", "minimum": 0 },
                    "target_intake": { "type": "boolean" },
                    "metrics_interval_secs": { "type": "integer", "minimum": 1 },
                    "results_interval_secs": { "type": "integer", "minimum": 1 }
                }
            }
        },
        "$defs": {
            "uuid": {
                "type": "string",
                "pattern": "^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
            }
        }
    })
});
