use crate::config::types::AppConfig;

/// Redact sensitive fields in a config for safe display.
/// Replaces session.signing_secret and api.token with "***".
pub fn redact_config(cfg: &AppConfig) -> AppConfig {
    let mut redacted = cfg.clone();

    if !redacted.session.signing_secret.is_empty() {
        redacted.session.signing_secret = "***".to_string();
    }

    if !redacted.api.token.is_empty() {
        redacted.api.token = "***".to_string();
    }

    redacted
}
