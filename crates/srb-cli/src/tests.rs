use std::{path::PathBuf, time::Duration};

use clap::Parser;
use tempfile::tempdir;

use crate::cli_args::Cli;
use crate::config_file::{
    config_search_dirs, discover_config, load_config_file, FileConfig, CONFIG_FILE_NAME,
};
use crate::startup::build_runtime_config;

const FULL_CONFIG: &str = r#"
[redmine]
url = "https://file.example.com/"
api_key = "file-key"
closed_statuses = [5, 6]
high_priorities = [4]

[slack]
app_token = "xapp-file"
bot_token = "xoxb-file"
api_base = "https://slack.file.example/api"
bot_name = "Tracker"
"#;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("slack-redmine-bot").chain(args.iter().copied()))
        .expect("parse cli")
}

fn file_config(raw: &str) -> FileConfig {
    toml::from_str(raw).expect("parse config")
}

#[test]
fn unit_cli_parses_comma_separated_ids_and_defaults() {
    let cli = parse(&[
        "--redmine-closed-status",
        "5,6",
        "--redmine-high-priority",
        "4",
        "--redmine-high-priority",
        "7",
    ]);
    assert_eq!(cli.redmine_closed_statuses, vec![5, 6]);
    assert_eq!(cli.redmine_high_priorities, vec![4, 7]);
    assert_eq!(cli.request_timeout_ms, 10_000);
    assert_eq!(cli.reconnect_delay_ms, 5_000);
    assert_eq!(cli.max_in_flight, 0);
}

#[test]
fn regression_cli_rejects_zero_request_timeout() {
    let error = Cli::try_parse_from(["slack-redmine-bot", "--request-timeout-ms", "0"])
        .expect_err("zero timeout");
    assert!(error.to_string().contains("greater than 0"));
}

#[test]
fn functional_build_runtime_config_prefers_flags_over_file() {
    let cli = parse(&[
        "--redmine-url",
        "https://flag.example.com",
        "--redmine-closed-status",
        "9",
        "--slack-bot-token",
        "xoxb-flag",
        "--slack-bot-user-id",
        "UBOT",
        "--max-in-flight",
        "8",
    ]);

    let config = build_runtime_config(&cli, file_config(FULL_CONFIG)).expect("config");

    assert_eq!(config.redmine_url, "https://flag.example.com");
    assert_eq!(config.redmine_api_key, "file-key");
    assert_eq!(config.closed_status_ids, vec![9]);
    assert_eq!(config.high_priority_ids, vec![4]);
    assert_eq!(config.bot_token, "xoxb-flag");
    assert_eq!(config.app_token, "xapp-file");
    assert_eq!(config.api_base, "https://slack.file.example/api");
    assert_eq!(config.bot_user_id.as_deref(), Some("UBOT"));
    assert_eq!(config.bot_identity.username, "Tracker");
    assert_eq!(config.max_in_flight, 8);
    assert_eq!(config.reconnect_delay, Duration::from_millis(5_000));
}

#[test]
fn functional_build_runtime_config_applies_builtin_defaults() {
    let cli = parse(&[
        "--redmine-url",
        "https://tracker.example.com",
        "--redmine-api-key",
        "key",
        "--slack-app-token",
        "xapp-1",
        "--slack-bot-token",
        "xoxb-1",
    ]);

    let config = build_runtime_config(&cli, FileConfig::default()).expect("config");

    assert_eq!(config.api_base, "https://slack.com/api");
    assert_eq!(config.bot_identity.username, "Redmine Bot");
    assert!(config.bot_identity.icon_url.is_some());
    assert!(config.closed_status_ids.is_empty());
    assert!(config.bot_user_id.is_none());
}

#[test]
fn regression_build_runtime_config_treats_blank_values_as_missing() {
    let cli = parse(&[
        "--redmine-url",
        "   ",
        "--redmine-api-key",
        "key",
        "--slack-app-token",
        "xapp-1",
        "--slack-bot-token",
        "xoxb-1",
    ]);

    let error = build_runtime_config(&cli, FileConfig::default()).expect_err("missing url");
    assert!(error.to_string().contains("SRB_REDMINE_URL"));
}

#[test]
fn unit_config_search_dirs_puts_explicit_dir_first() {
    let dirs = config_search_dirs(Some(PathBuf::from("/opt/srb").as_path()));
    assert_eq!(
        dirs,
        vec![
            PathBuf::from("/opt/srb"),
            PathBuf::from("/etc/slack-redmine-bot"),
            PathBuf::from("."),
        ]
    );
    assert_eq!(config_search_dirs(None).len(), 2);
}

#[test]
fn functional_discover_config_loads_explicit_directory() {
    let dir = tempdir().expect("tempdir");
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), FULL_CONFIG).expect("write config");

    let (path, config) = discover_config(Some(dir.path()))
        .expect("discover")
        .expect("config found");

    assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));
    assert_eq!(config.redmine.closed_statuses, vec![5, 6]);
    assert_eq!(config.slack.bot_token.as_deref(), Some("xoxb-file"));
}

#[test]
fn regression_load_config_file_rejects_unknown_keys() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "[redmine]\nurll = \"https://typo.example.com\"\n").expect("write");

    let error = load_config_file(&path).expect_err("unknown key");
    assert!(format!("{error:#}").contains("failed to parse config file"));
}
