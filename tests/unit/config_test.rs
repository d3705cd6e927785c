use rampart::config::types::{LogFormat, LogLevel, SubjectFormat, TokenAlgorithm};
use rampart::config::{load_config, parse_config, redact::redact_config};
use std::io::Write;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

#[test]
fn full_config_parses() {
    let toml_str = format!(
        r##"
[server]
listen = "127.0.0.1:8080"
shutdown_timeout = 5
max_body_bytes = 2048

[firewall]
enabled = true
bypass_paths = ["/user_login"]
bad_agents = ["sqlmap", "masscan"]
payload_signatures = ["$where", "$ne"]
rate_window_secs = 30
rate_limit = 50
agent_ban_secs = 300
rate_ban_secs = 120
payload_ban_secs = 1800
sweep_interval_secs = 15
trusted_proxies = ["10.0.0.0/8"]
ban_whitelist = ["192.168.1.0/24"]
max_tracked_clients = 5000

[session]
signing_secret = "{SECRET}"
algorithm = "HS512"
cookie_name = "sid"
device_binding_enabled = false
subject_format = "opaque"
token_ttl_secs = 600
leeway_secs = 5

[logging]
level = "debug"
format = "json"

[metrics]
enabled = true
path = "/internal/metrics"

[api]
enabled = true
token = "admin-token-0123456789"

[[route_limits]]
path_prefix = "/verify_otp"
window_secs = 300
max_requests = 5
message = "OTP spam detected"

[[route_limits]]
path_prefix = "/api"
window_secs = 60
max_requests = 120
message = "Too many requests"
kind = "ROBOT_CHECK"

[[accounts]]
subject_id = "65f1c0a2b3d4e5f601234567"
role = "admin"
mobile_verified = true
"##
    );

    let cfg = parse_config(&toml_str).unwrap();
    assert_eq!(cfg.server.listen, "127.0.0.1:8080");
    assert_eq!(cfg.server.max_body_bytes, 2048);
    assert_eq!(cfg.firewall.rate_limit, 50);
    assert_eq!(cfg.firewall.trusted_proxies.len(), 1);
    assert_eq!(cfg.firewall.ban_whitelist[0].to_string(), "192.168.1.0/24");
    assert_eq!(cfg.session.algorithm, TokenAlgorithm::HS512);
    assert_eq!(cfg.session.subject_format, SubjectFormat::Opaque);
    assert!(!cfg.session.device_binding_enabled);
    assert_eq!(cfg.logging.level, LogLevel::Debug);
    assert_eq!(cfg.logging.format, LogFormat::Json);
    assert_eq!(cfg.route_limits.len(), 2);
    assert_eq!(cfg.route_limits[0].kind, None);
    assert_eq!(cfg.route_limits[1].kind.as_deref(), Some("ROBOT_CHECK"));
    assert_eq!(cfg.accounts[0].role.as_deref(), Some("admin"));
    // unspecified account flags default to verified by email
    assert!(cfg.accounts[0].verified);
    assert!(cfg.accounts[0].email_verified);
    assert!(!cfg.accounts[0].deleted);
}

#[test]
fn invalid_cidr_rejected() {
    let toml_str = format!(
        "[firewall]\ntrusted_proxies = [\"10.0.0.0/33\"]\n\n[session]\nsigning_secret = \"{SECRET}\"\n"
    );
    assert!(parse_config(&toml_str).is_err());
}

#[test]
fn unknown_algorithm_rejected() {
    let toml_str =
        format!("[session]\nsigning_secret = \"{SECRET}\"\nalgorithm = \"RS256\"\n");
    assert!(parse_config(&toml_str).is_err());
}

#[test]
fn empty_secret_rejected() {
    let err = parse_config("[session]\nsigning_secret = \"\"\n").unwrap_err();
    assert!(err.to_string().contains("signing_secret"));
}

#[test]
fn api_enabled_without_token_rejected() {
    let toml_str = format!("[session]\nsigning_secret = \"{SECRET}\"\n\n[api]\nenabled = true\n");
    assert!(parse_config(&toml_str).is_err());
}

#[test]
fn route_limit_prefix_must_be_absolute() {
    let toml_str = format!(
        "[session]\nsigning_secret = \"{SECRET}\"\n\n[[route_limits]]\npath_prefix = \"api\"\nwindow_secs = 60\nmax_requests = 1\n"
    );
    assert!(parse_config(&toml_str).is_err());
}

#[test]
fn zero_ban_duration_rejected() {
    let toml_str = format!(
        "[firewall]\npayload_ban_secs = 0\n\n[session]\nsigning_secret = \"{SECRET}\"\n"
    );
    assert!(parse_config(&toml_str).is_err());
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[session]\nsigning_secret = \"{SECRET}\"").unwrap();
    let cfg = load_config(file.path()).unwrap();
    assert_eq!(cfg.session.signing_secret, SECRET);
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_config(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn oversized_file_refused() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[session]\nsigning_secret = \"{SECRET}\"").unwrap();
    let padding = "#".repeat(1024);
    for _ in 0..1100 {
        writeln!(file, "{padding}").unwrap();
    }
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("too large"));
}

#[test]
fn redaction_hides_secrets_only() {
    let toml_str = format!(
        "[session]\nsigning_secret = \"{SECRET}\"\n\n[api]\nenabled = true\ntoken = \"admin-token-0123456789\"\n"
    );
    let cfg = parse_config(&toml_str).unwrap();
    let redacted = redact_config(&cfg);

    assert_ne!(redacted.session.signing_secret, SECRET);
    assert_ne!(redacted.api.token, "admin-token-0123456789");
    assert_eq!(redacted.session.cookie_name, cfg.session.cookie_name);
    assert_eq!(redacted.firewall.rate_limit, cfg.firewall.rate_limit);

    let rendered = toml::to_string_pretty(&redacted).unwrap();
    assert!(!rendered.contains(SECRET));
}

#[test]
fn debug_output_masks_secret() {
    let toml_str = format!("[session]\nsigning_secret = \"{SECRET}\"\n");
    let cfg = parse_config(&toml_str).unwrap();
    let dbg = format!("{:?}", cfg.session);
    assert!(!dbg.contains(SECRET));
    assert!(dbg.contains("***"));
}
