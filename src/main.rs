use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use rampart::cli::{Cli, Command};
use rampart::config;
use rampart::config::types::AppConfig;
use rampart::session::token::TokenCodec;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Command::CheckConfig) => {
            let cfg = resolve_config(&cli.config)?;
            println!("Configuration is valid.");
            println!("  Listen: {}", cfg.server.listen);
            println!(
                "  Firewall: {} ({} req / {}s)",
                if cfg.firewall.enabled { "enabled" } else { "disabled" },
                cfg.firewall.rate_limit,
                cfg.firewall.rate_window_secs
            );
            println!("  Token algorithm: {}", cfg.session.algorithm);
            println!("  Route limits: {}", cfg.route_limits.len());
            println!("  Accounts: {}", cfg.accounts.len());
            return Ok(());
        }
        Some(Command::ShowConfig { format }) => {
            let app_config = resolve_config(&cli.config)?;
            let redacted = config::redact::redact_config(&app_config);

            match format.as_str() {
                "json" => {
                    let json = serde_json::to_string_pretty(&redacted)?;
                    println!("{}", json);
                }
                "toml" => {
                    let toml_str = toml::to_string_pretty(&redacted)?;
                    println!("{}", toml_str);
                }
                _ => {
                    anyhow::bail!("unsupported format '{}' (available: toml, json)", format);
                }
            }
            return Ok(());
        }
        Some(Command::IssueToken {
            subject,
            user_agent,
            ttl,
        }) => {
            let cfg = resolve_config(&cli.config)?;
            let codec = TokenCodec::from_config(&cfg.session);
            let ttl = Duration::from_secs(ttl.unwrap_or(cfg.session.token_ttl_secs));
            let token = codec
                .issue(subject, user_agent.as_deref(), ttl)
                .context("issuing session token")?;
            println!("{}", token);
            return Ok(());
        }
        Some(Command::Init { output, force }) => {
            if output.exists() && !force {
                anyhow::bail!(
                    "{} already exists (pass --force to overwrite)",
                    output.display()
                );
            }
            let secret = hex::encode(rand::random::<[u8; 32]>());
            std::fs::write(output, generate_config_toml(&secret))
                .with_context(|| format!("writing {}", output.display()))?;
            restrict_permissions(output);
            eprintln!("Configuration written to: {}", output.display());
            eprintln!("  A random 256-bit signing secret was generated");
            eprintln!();
            eprintln!("Start the gateway with:");
            eprintln!("  rampart -c {}", output.display());
            return Ok(());
        }
        Some(Command::Completions { shell }) => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "rampart", &mut std::io::stdout());
            return Ok(());
        }
        Some(Command::Serve) | None => {}
    }

    let app_config = resolve_config(&cli.config)?;

    // Setup logging (CLI override > config)
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| app_config.logging.level.to_string());
    rampart::logging::setup_logging(&log_level, app_config.logging.format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %app_config.server.listen,
        "Starting rampart gateway"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if let Err(e) = rampart::server::run(app_config).await {
            error!(error = %e, "Server error");
            std::process::exit(1);
        }
    });

    Ok(())
}

/// Load config: file (plus env overrides), else env vars alone, else the
/// file error.
fn resolve_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let mut cfg = config::load_config(path)?;
        config::env::apply_env_overrides(&mut cfg);
        config::parse_config_validate(&cfg).context("validating config after env overrides")?;
        Ok(cfg)
    } else if config::env::can_build_from_env() {
        let cfg = config::env::build_config_from_env()?;
        config::parse_config_validate(&cfg)?;
        eprintln!("No config file found, using environment variables");
        Ok(cfg)
    } else {
        // Produces a clear "file not found" error
        config::load_config(path)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        eprintln!("warning: could not restrict {} to 0600: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

fn generate_config_toml(signing_secret: &str) -> String {
    format!(
        r#"[server]
listen = "0.0.0.0:1928"
shutdown_timeout = 30
max_body_bytes = 10240

[firewall]
enabled = true
bypass_paths = ["/user_login", "/auth/google", "/auth/github"]
bad_agents = ["sqlmap", "nikto", "acunetix"]
payload_signatures = ["$where", "<script", "javascript:"]
rate_window_secs = 60
rate_limit = 100
agent_ban_secs = 600
rate_ban_secs = 60
payload_ban_secs = 900
sweep_interval_secs = 60
trusted_proxies = []
ban_whitelist = ["127.0.0.1/32"]

[session]
signing_secret = "{signing_secret}"
algorithm = "HS256"
cookie_name = "access_token"
device_binding_enabled = true
subject_format = "object_id"
token_ttl_secs = 86400

[logging]
level = "info"
format = "pretty"

[metrics]
enabled = false
path = "/metrics"

[api]
enabled = false
token = ""

[[route_limits]]
path_prefix = "/user_login"
window_secs = 600
max_requests = 10
message = "Too many login attempts, try later"

[[route_limits]]
path_prefix = "/verify_otp"
window_secs = 300
max_requests = 5
message = "OTP spam detected"

# [[accounts]]
# subject_id = "65f1c0a2b3d4e5f601234567"
# role = "user"
# verified = true
# email_verified = true
"#,
        signing_secret = signing_secret,
    )
}
