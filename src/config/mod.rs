pub mod env;
pub mod redact;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;
use types::AppConfig;

/// Maximum config file size (1 MB)
const MAX_CONFIG_SIZE: u64 = 1_048_576;

/// Shortest signing secret accepted for HMAC session tokens
const MIN_SECRET_LEN: usize = 32;

/// Shortest admin API token accepted
const MIN_API_TOKEN_LEN: usize = 16;

/// Load and validate configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("reading config metadata: {}", path.display()))?;
    if metadata.len() > MAX_CONFIG_SIZE {
        anyhow::bail!(
            "config file too large: {} bytes (max {} bytes)",
            metadata.len(),
            MAX_CONFIG_SIZE
        );
    }

    // The file carries the signing secret
    check_config_file_permissions(path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    parse_config(&content)
}

#[cfg(unix)]
fn check_config_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                tracing::warn!(
                    path = %path.display(),
                    mode = format!("{:04o}", mode & 0o7777),
                    "Config file is readable by group/others. \
                     Consider restricting permissions to 0600 since it holds the signing secret."
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not check config file permissions"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_config_file_permissions(_path: &Path) {}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content).context("parsing TOML configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate an already-constructed AppConfig (e.g. built from env vars).
pub fn parse_config_validate(config: &AppConfig) -> Result<()> {
    validate_config(config)
}

fn validate_config(config: &AppConfig) -> Result<()> {
    validate_server(config)?;
    validate_firewall(config)?;
    validate_session(config)?;
    validate_route_limits(config)?;
    validate_api(config)?;
    validate_accounts(config)?;
    Ok(())
}

fn validate_server(config: &AppConfig) -> Result<()> {
    if config.server.listen.is_empty() {
        anyhow::bail!("server.listen must not be empty");
    }
    if config.server.max_body_bytes == 0 {
        anyhow::bail!("server.max_body_bytes must be > 0");
    }
    if config.metrics.enabled && !config.metrics.path.starts_with('/') {
        anyhow::bail!(
            "metrics.path must start with '/' (got '{}')",
            config.metrics.path
        );
    }
    Ok(())
}

fn validate_firewall(config: &AppConfig) -> Result<()> {
    let fw = &config.firewall;
    if fw.rate_window_secs == 0 {
        anyhow::bail!("firewall.rate_window_secs must be > 0");
    }
    if fw.rate_limit == 0 {
        anyhow::bail!("firewall.rate_limit must be > 0");
    }
    if fw.sweep_interval_secs == 0 {
        anyhow::bail!("firewall.sweep_interval_secs must be > 0");
    }
    if fw.max_tracked_clients == 0 {
        anyhow::bail!("firewall.max_tracked_clients must be > 0");
    }
    for (name, secs) in [
        ("agent_ban_secs", fw.agent_ban_secs),
        ("rate_ban_secs", fw.rate_ban_secs),
        ("payload_ban_secs", fw.payload_ban_secs),
    ] {
        if secs == 0 {
            anyhow::bail!("firewall.{name} must be > 0");
        }
    }
    for path in &fw.bypass_paths {
        if !path.starts_with('/') {
            anyhow::bail!("firewall.bypass_paths entry must start with '/': {path}");
        }
    }
    if fw.bad_agents.iter().any(|s| s.trim().is_empty()) {
        anyhow::bail!("firewall.bad_agents must not contain empty signatures");
    }
    if fw.payload_signatures.iter().any(|s| s.trim().is_empty()) {
        anyhow::bail!("firewall.payload_signatures must not contain empty signatures");
    }
    if fw.agent_ban_secs > fw.payload_ban_secs {
        tracing::warn!(
            agent_ban_secs = fw.agent_ban_secs,
            payload_ban_secs = fw.payload_ban_secs,
            "Agent-signature bans outlast payload-injection bans; \
             ban durations usually escalate with severity"
        );
    }
    Ok(())
}

fn validate_session(config: &AppConfig) -> Result<()> {
    let secret = &config.session.signing_secret;
    if secret.is_empty() {
        anyhow::bail!("session.signing_secret must be set");
    }
    if secret.len() < MIN_SECRET_LEN {
        anyhow::bail!(
            "session.signing_secret is too short ({} bytes, minimum {})",
            secret.len(),
            MIN_SECRET_LEN
        );
    }
    if config.session.cookie_name.is_empty() {
        anyhow::bail!("session.cookie_name must not be empty");
    }
    if config.session.token_ttl_secs == 0 {
        anyhow::bail!("session.token_ttl_secs must be > 0");
    }
    Ok(())
}

fn validate_route_limits(config: &AppConfig) -> Result<()> {
    for (i, rule) in config.route_limits.iter().enumerate() {
        if !rule.path_prefix.starts_with('/') {
            anyhow::bail!(
                "route_limits[{i}].path_prefix must start with '/': {}",
                rule.path_prefix
            );
        }
        if rule.window_secs == 0 || rule.max_requests == 0 {
            anyhow::bail!(
                "route_limits[{i}] ({}) needs window_secs > 0 and max_requests > 0",
                rule.path_prefix
            );
        }
    }
    Ok(())
}

fn validate_api(config: &AppConfig) -> Result<()> {
    if config.api.enabled && config.api.token.is_empty() {
        anyhow::bail!("api.token must be set when api is enabled");
    }
    if config.api.enabled && config.api.token.len() < MIN_API_TOKEN_LEN {
        anyhow::bail!(
            "API token is too short ({} chars, minimum {})",
            config.api.token.len(),
            MIN_API_TOKEN_LEN
        );
    }
    Ok(())
}

fn validate_accounts(config: &AppConfig) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for account in &config.accounts {
        if account.subject_id.is_empty() {
            anyhow::bail!("account entry has empty subject_id");
        }
        if !seen.insert(&account.subject_id) {
            anyhow::bail!("duplicate account subject_id: {}", account.subject_id);
        }
    }
    Ok(())
}
