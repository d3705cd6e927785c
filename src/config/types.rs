use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Log level enum (replaces stringly-typed field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log format enum (replaces stringly-typed field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// The single HMAC algorithm session tokens are signed with.
/// Only one is ever accepted at verification time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum TokenAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

impl fmt::Display for TokenAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenAlgorithm::HS256 => write!(f, "HS256"),
            TokenAlgorithm::HS384 => write!(f, "HS384"),
            TokenAlgorithm::HS512 => write!(f, "HS512"),
        }
    }
}

/// Accepted shape of the subject identifier carried in a session token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectFormat {
    /// 24 hexadecimal characters (document-store object id)
    #[default]
    ObjectId,
    /// Any non-empty string
    Opaque,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub firewall: FirewallConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub route_limits: Vec<RouteLimitConfig>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Seconds to wait for in-flight requests on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    /// Largest accepted request body; bigger bodies get 413
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            shutdown_timeout: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:1928".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    10 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FirewallConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path prefixes that skip the firewall (login and OAuth entry/callback)
    #[serde(default = "default_bypass_paths")]
    pub bypass_paths: Vec<String>,
    /// Case-insensitive user-agent substrings of known scanners
    #[serde(default = "default_bad_agents")]
    pub bad_agents: Vec<String>,
    /// Case-insensitive body substrings of injection attempts
    #[serde(default = "default_payload_signatures")]
    pub payload_signatures: Vec<String>,
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_agent_ban_secs")]
    pub agent_ban_secs: u64,
    #[serde(default = "default_rate_ban_secs")]
    pub rate_ban_secs: u64,
    #[serde(default = "default_payload_ban_secs")]
    pub payload_ban_secs: u64,
    /// Janitor sweep interval in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Peers allowed to set forwarding headers. Empty = every peer is trusted.
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    /// Clients that are never banned or rate limited
    #[serde(default)]
    pub ban_whitelist: Vec<IpNet>,
    /// Upper bound on clients tracked by the rate limiter
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,
}

impl FirewallConfig {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn agent_ban(&self) -> Duration {
        Duration::from_secs(self.agent_ban_secs)
    }

    pub fn rate_ban(&self) -> Duration {
        Duration::from_secs(self.rate_ban_secs)
    }

    pub fn payload_ban(&self) -> Duration {
        Duration::from_secs(self.payload_ban_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bypass_paths: default_bypass_paths(),
            bad_agents: default_bad_agents(),
            payload_signatures: default_payload_signatures(),
            rate_window_secs: default_rate_window_secs(),
            rate_limit: default_rate_limit(),
            agent_ban_secs: default_agent_ban_secs(),
            rate_ban_secs: default_rate_ban_secs(),
            payload_ban_secs: default_payload_ban_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            trusted_proxies: Vec::new(),
            ban_whitelist: Vec::new(),
            max_tracked_clients: default_max_tracked_clients(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bypass_paths() -> Vec<String> {
    [
        "/user_login",
        "/auth/google",
        "/auth/github",
        "/auth/google/callback",
        "/auth/github/callback",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_bad_agents() -> Vec<String> {
    ["sqlmap", "nikto", "acunetix"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_payload_signatures() -> Vec<String> {
    ["$where", "<script", "javascript:"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_rate_window_secs() -> u64 {
    60
}
fn default_rate_limit() -> u32 {
    100
}
fn default_agent_ban_secs() -> u64 {
    600
}
fn default_rate_ban_secs() -> u64 {
    60
}
fn default_payload_ban_secs() -> u64 {
    900
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_max_tracked_clients() -> usize {
    100_000
}

#[derive(Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// HMAC secret session tokens are signed with
    pub signing_secret: String,
    #[serde(default)]
    pub algorithm: TokenAlgorithm,
    /// Cookie consulted when no Authorization header is present
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_true")]
    pub device_binding_enabled: bool,
    #[serde(default)]
    pub subject_format: SubjectFormat,
    /// Lifetime of tokens minted by `issue-token`
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Clock skew tolerated on the expiry claim
    #[serde(default)]
    pub leeway_secs: u64,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field(
                "signing_secret",
                &if self.signing_secret.is_empty() {
                    "(empty)"
                } else {
                    "***"
                },
            )
            .field("algorithm", &self.algorithm)
            .field("cookie_name", &self.cookie_name)
            .field("device_binding_enabled", &self.device_binding_enabled)
            .field("subject_format", &self.subject_format)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl SessionConfig {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            signing_secret: secret.into(),
            algorithm: TokenAlgorithm::default(),
            cookie_name: default_cookie_name(),
            device_binding_enabled: true,
            subject_format: SubjectFormat::default(),
            token_ttl_secs: default_token_ttl_secs(),
            leeway_secs: 0,
        }
    }
}

fn default_cookie_name() -> String {
    "access_token".to_string()
}

fn default_token_ttl_secs() -> u64 {
    86_400
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("enabled", &self.enabled)
            .field(
                "token",
                &if self.token.is_empty() {
                    "(empty)"
                } else {
                    "***"
                },
            )
            .finish()
    }
}

/// Per-route request budget applied after the firewall.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteLimitConfig {
    pub path_prefix: String,
    pub window_secs: u64,
    pub max_requests: u32,
    #[serde(default = "default_route_limit_message")]
    pub message: String,
    /// When set, the 429 body becomes `{"type": kind, "message": message}`
    #[serde(default)]
    pub kind: Option<String>,
}

fn default_route_limit_message() -> String {
    "Too many requests".to_string()
}

/// Static account record served by the built-in user directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    pub subject_id: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default = "default_true")]
    pub verified: bool,
    #[serde(default = "default_true")]
    pub email_verified: bool,
    #[serde(default)]
    pub mobile_verified: bool,
}
