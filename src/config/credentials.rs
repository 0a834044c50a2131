use crate::errors::AgentError;
use tracing::debug;

/// Resolve the engine password. `$NAME` reads environment variable `NAME`;
/// anything else is taken literally. A referenced variable that is not set
/// is a configuration error rather than a silent fallback to the literal.
pub fn resolve_credential(value: &str) -> Result<String, AgentError> {
    let Some(var_name) = value.strip_prefix('$') else {
        return Ok(value.to_string());
    };
    if var_name.is_empty() {
        return Err(AgentError::Config("credential reference '$' names no variable".into()));
    }
    match std::env::var(var_name) {
        Ok(resolved) => {
            debug!(var = %var_name, "Resolved engine credential from environment");
            Ok(resolved)
        }
        Err(e) => Err(AgentError::Config(format!(
            "credential variable {} is not usable: {}",
            var_name, e
        ))),
    }
}

/// Mask each secret in `text` before it reaches a log line or an error.
/// Secrets under four characters would mangle ordinary words and are left
/// as they are.
pub fn redact_credentials(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|secret| secret.len() >= 4)
        .fold(text.to_string(), |acc, secret| acc.replace(secret, "[REDACTED]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_password() {
        assert_eq!(resolve_credential("admin").unwrap(), "admin");
    }

    #[test]
    fn test_password_from_environment() {
        std::env::set_var("OPENVAS_AGENT_TEST_GVM_PASSWORD", "from-env");
        assert_eq!(resolve_credential("$OPENVAS_AGENT_TEST_GVM_PASSWORD").unwrap(), "from-env");
        std::env::remove_var("OPENVAS_AGENT_TEST_GVM_PASSWORD");
    }

    #[test]
    fn test_unset_variable_is_config_error() {
        let err = resolve_credential("$OPENVAS_AGENT_UNSET_VARIABLE").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert!(resolve_credential("$").is_err());
    }

    #[test]
    fn test_redaction_in_auth_error() {
        let text = "authenticate failed: 400 bad credentials for S3cret123";
        let redacted = redact_credentials(text, &["S3cret123"]);
        assert_eq!(redacted, "authenticate failed: 400 bad credentials for [REDACTED]");
    }

    #[test]
    fn test_short_secret_left_alone() {
        assert_eq!(redact_credentials("user=ab", &["ab"]), "user=ab");
        assert_eq!(redact_credentials("nothing here", &[]), "nothing here");
    }
}
