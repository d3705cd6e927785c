//! Environment variable configuration support.
//!
//! Provides three modes:
//! 1. `RAMPART_CONFIG` env var to specify config file path
//! 2. Full config from env vars (container mode, no file)
//! 3. Hybrid: file + env var overrides

use crate::config::types::*;

/// Check if enough env vars are set to build a full config without a file.
/// Requires at minimum a signing secret (inline or from a file).
pub fn can_build_from_env() -> bool {
    std::env::var("RAMPART_SIGNING_SECRET").is_ok()
        || std::env::var("RAMPART_SIGNING_SECRET_FILE").is_ok()
}

/// Build a complete AppConfig from environment variables.
pub fn build_config_from_env() -> anyhow::Result<AppConfig> {
    let secret = resolve_env_or_file("RAMPART_SIGNING_SECRET")?
        .ok_or_else(|| anyhow::anyhow!("required env var RAMPART_SIGNING_SECRET is not set"))?;

    let mut config = AppConfig {
        server: ServerConfig::default(),
        firewall: FirewallConfig::default(),
        session: SessionConfig::with_secret(secret),
        logging: LoggingConfig::default(),
        metrics: MetricsConfig::default(),
        api: ApiConfig::default(),
        route_limits: Vec::new(),
        accounts: Vec::new(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Apply `RAMPART_*` overrides on top of a loaded configuration.
/// Unset or empty variables leave the existing value untouched.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Some(v) = opt_env("RAMPART_LISTEN") {
        config.server.listen = v;
    }
    config.server.max_body_bytes =
        parse_env("RAMPART_MAX_BODY_BYTES", config.server.max_body_bytes);

    let fw = &mut config.firewall;
    fw.enabled = parse_bool_env("RAMPART_FIREWALL_ENABLED", fw.enabled);
    fw.rate_limit = parse_env("RAMPART_RATE_LIMIT", fw.rate_limit);
    fw.rate_window_secs = parse_env("RAMPART_RATE_WINDOW_SECS", fw.rate_window_secs);
    fw.agent_ban_secs = parse_env("RAMPART_AGENT_BAN_SECS", fw.agent_ban_secs);
    fw.rate_ban_secs = parse_env("RAMPART_RATE_BAN_SECS", fw.rate_ban_secs);
    fw.payload_ban_secs = parse_env("RAMPART_PAYLOAD_BAN_SECS", fw.payload_ban_secs);
    fw.sweep_interval_secs = parse_env("RAMPART_SWEEP_INTERVAL_SECS", fw.sweep_interval_secs);
    if let Some(paths) = opt_csv_env("RAMPART_BYPASS_PATHS") {
        fw.bypass_paths = paths;
    }
    if let Some(agents) = opt_csv_env("RAMPART_BAD_AGENTS") {
        fw.bad_agents = agents;
    }
    match parse_cidr_csv_env("RAMPART_TRUSTED_PROXIES") {
        Ok(Some(nets)) => fw.trusted_proxies = nets,
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring RAMPART_TRUSTED_PROXIES"),
    }

    let session = &mut config.session;
    match resolve_env_or_file("RAMPART_SIGNING_SECRET") {
        Ok(Some(secret)) => session.signing_secret = secret,
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring RAMPART_SIGNING_SECRET_FILE"),
    }
    session.device_binding_enabled =
        parse_bool_env("RAMPART_DEVICE_BINDING", session.device_binding_enabled);
    if let Some(name) = opt_env("RAMPART_COOKIE_NAME") {
        session.cookie_name = name;
    }

    if let Some(level) = opt_env("RAMPART_LOG_LEVEL") {
        match parse_log_level(&level) {
            Ok(l) => config.logging.level = l,
            Err(e) => tracing::warn!(error = %e, "Ignoring RAMPART_LOG_LEVEL"),
        }
    }
    if let Some(format) = opt_env("RAMPART_LOG_FORMAT") {
        match parse_log_format(&format) {
            Ok(f) => config.logging.format = f,
            Err(e) => tracing::warn!(error = %e, "Ignoring RAMPART_LOG_FORMAT"),
        }
    }

    config.metrics.enabled = parse_bool_env("RAMPART_METRICS_ENABLED", config.metrics.enabled);
    config.api.enabled = parse_bool_env("RAMPART_API_ENABLED", config.api.enabled);
    if let Some(token) = opt_env("RAMPART_API_TOKEN") {
        config.api.token = token;
    }
}

fn opt_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read `KEY` directly, or the trimmed content of the file named by `KEY_FILE`.
fn resolve_env_or_file(key: &str) -> anyhow::Result<Option<String>> {
    if let Some(v) = opt_env(key) {
        return Ok(Some(v));
    }
    let file_key = format!("{key}_FILE");
    match opt_env(&file_key) {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("reading {file_key} ({path}): {e}"))?;
            Ok(Some(content.trim().to_string()))
        }
        None => Ok(None),
    }
}

fn parse_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    opt_env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    opt_env(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn opt_csv_env(key: &str) -> Option<Vec<String>> {
    opt_env(key).map(|s| {
        s.split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    })
}

fn parse_cidr_csv_env(key: &str) -> anyhow::Result<Option<Vec<ipnet::IpNet>>> {
    match opt_csv_env(key) {
        Some(entries) => entries
            .iter()
            .map(|s| {
                s.parse::<ipnet::IpNet>()
                    .or_else(|_| s.parse::<std::net::IpAddr>().map(ipnet::IpNet::from))
                    .map_err(|e| anyhow::anyhow!("invalid CIDR '{s}' in {key}: {e}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .map(Some),
        None => Ok(None),
    }
}

fn parse_log_level(s: &str) -> anyhow::Result<LogLevel> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        other => anyhow::bail!("invalid log level '{other}'"),
    }
}

fn parse_log_format(s: &str) -> anyhow::Result<LogFormat> {
    match s.to_ascii_lowercase().as_str() {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => anyhow::bail!("invalid log format '{other}'"),
    }
}
