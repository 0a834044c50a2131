use super::types::AgentError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    /// Transient errors may be swallowed by a polling loop and retried on
    /// the next tick. Everything else is fatal to the enclosing call.
    pub transient: bool,
}

impl AgentError {
    /// Classify this error to determine its type and whether a poll loop may
    /// carry on past it.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            AgentError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                transient: true,
            },

            AgentError::Session(_) => ErrorClassification {
                error_type: "SessionError",
                transient: false,
            },
            AgentError::ProtocolCall(_) => ErrorClassification {
                error_type: "ProtocolCallError",
                transient: false,
            },
            AgentError::Parse(_) => ErrorClassification {
                error_type: "ParseError",
                transient: false,
            },
            AgentError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                transient: false,
            },
            AgentError::Backend(_) => ErrorClassification {
                error_type: "BackendError",
                transient: false,
            },
            AgentError::InvalidTarget(_) => ErrorClassification {
                error_type: "InvalidTargetError",
                transient: false,
            },
            AgentError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                transient: false,
            },
            AgentError::Io(_) => ErrorClassification {
                error_type: "IoError",
                transient: false,
            },
            AgentError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                transient: false,
            },
            AgentError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                transient: false,
            },
            AgentError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                transient: false,
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        self.classify().transient
    }
}
