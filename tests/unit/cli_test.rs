use clap::Parser;
use rampart::cli::{Cli, Command};

// ---------------------------------------------------------------------------
// Test 1: no subcommand means serve with config.toml
// ---------------------------------------------------------------------------
#[test]
fn default_invocation_serves() {
    let cli = Cli::try_parse_from(["rampart"]).unwrap();
    assert!(cli.command.is_none());
    assert!(cli.log_level.is_none());
}

// ---------------------------------------------------------------------------
// Test 2: config path and log level flags
// ---------------------------------------------------------------------------
#[test]
fn config_and_log_level_flags() {
    let cli = Cli::try_parse_from([
        "rampart",
        "-c",
        "/etc/rampart/gateway.toml",
        "--log-level",
        "debug",
        "serve",
    ])
    .unwrap();
    assert_eq!(cli.config.to_str().unwrap(), "/etc/rampart/gateway.toml");
    assert_eq!(cli.log_level.as_deref(), Some("debug"));
    assert!(matches!(cli.command, Some(Command::Serve)));
}

// ---------------------------------------------------------------------------
// Test 3: issue-token arguments
// ---------------------------------------------------------------------------
#[test]
fn issue_token_arguments() {
    let cli = Cli::try_parse_from([
        "rampart",
        "issue-token",
        "--subject",
        "65f1c0a2b3d4e5f601234567",
        "--user-agent",
        "Mozilla/5.0",
        "--ttl",
        "600",
    ])
    .unwrap();
    match cli.command {
        Some(Command::IssueToken {
            subject,
            user_agent,
            ttl,
        }) => {
            assert_eq!(subject, "65f1c0a2b3d4e5f601234567");
            assert_eq!(user_agent.as_deref(), Some("Mozilla/5.0"));
            assert_eq!(ttl, Some(600));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn issue_token_requires_subject() {
    assert!(Cli::try_parse_from(["rampart", "issue-token"]).is_err());
}

// ---------------------------------------------------------------------------
// Test 4: show-config, init and completions
// ---------------------------------------------------------------------------
#[test]
fn show_config_format_defaults_to_toml() {
    let cli = Cli::try_parse_from(["rampart", "show-config"]).unwrap();
    match cli.command {
        Some(Command::ShowConfig { format }) => assert_eq!(format, "toml"),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn init_output_and_force() {
    let cli = Cli::try_parse_from(["rampart", "init", "-o", "/tmp/r.toml", "--force"]).unwrap();
    match cli.command {
        Some(Command::Init { output, force }) => {
            assert_eq!(output.to_str().unwrap(), "/tmp/r.toml");
            assert!(force);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn completions_shell() {
    let cli = Cli::try_parse_from(["rampart", "completions", "zsh"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Command::Completions {
            shell: clap_complete::Shell::Zsh
        })
    ));
    assert!(Cli::try_parse_from(["rampart", "completions", "tcsh"]).is_err());
}
