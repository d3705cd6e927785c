use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "rampart",
    version,
    about = "Adaptive abuse firewall and session gate for HTTP services"
)]
pub struct Cli {
    /// Path to configuration file (also settable via RAMPART_CONFIG env var)
    #[arg(short, long, default_value = "config.toml", env = "RAMPART_CONFIG")]
    pub config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway (default)
    Serve,
    /// Validate configuration file
    CheckConfig,
    /// Show the effective configuration (with sensitive fields redacted)
    ShowConfig {
        /// Output format: toml or json
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Mint a session token signed with the configured secret
    IssueToken {
        /// Subject identifier (userId claim)
        #[arg(long)]
        subject: String,
        /// User agent to bind the token to
        #[arg(long)]
        user_agent: Option<String>,
        /// Lifetime in seconds (defaults to session.token_ttl_secs)
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Generate a config file with a random signing secret
    Init {
        /// Output file path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
