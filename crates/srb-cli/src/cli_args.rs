use std::path::PathBuf;

use clap::Parser;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "slack-redmine-bot",
    about = "Posts Redmine issue details into Slack conversations that mention them",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "config",
        env = "SRB_CONFIG",
        help = "Directory searched first for config.toml"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long = "redmine-url",
        env = "SRB_REDMINE_URL",
        help = "Redmine base URL, e.g. https://tracker.example.com"
    )]
    pub redmine_url: Option<String>,

    #[arg(
        long = "redmine-api-key",
        env = "SRB_REDMINE_API_KEY",
        hide_env_values = true,
        help = "Redmine REST API key sent as X-Redmine-API-Key"
    )]
    pub redmine_api_key: Option<String>,

    #[arg(
        long = "redmine-closed-status",
        env = "SRB_REDMINE_CLOSED_STATUSES",
        value_delimiter = ',',
        help = "Redmine status id treated as closed (repeatable or comma separated)"
    )]
    pub redmine_closed_statuses: Vec<u64>,

    #[arg(
        long = "redmine-high-priority",
        env = "SRB_REDMINE_HIGH_PRIORITIES",
        value_delimiter = ',',
        help = "Redmine priority id treated as high priority (repeatable or comma separated)"
    )]
    pub redmine_high_priorities: Vec<u64>,

    #[arg(
        long = "slack-app-token",
        env = "SRB_SLACK_APP_TOKEN",
        hide_env_values = true,
        help = "Slack Socket Mode app token (xapp-...)"
    )]
    pub slack_app_token: Option<String>,

    #[arg(
        long = "slack-bot-token",
        env = "SRB_SLACK_BOT_TOKEN",
        hide_env_values = true,
        help = "Slack bot token for Web API (xoxb-...)"
    )]
    pub slack_bot_token: Option<String>,

    #[arg(
        long = "slack-bot-user-id",
        env = "SRB_SLACK_BOT_USER_ID",
        help = "Bot user id whose own messages are ignored; resolved through auth.test when unset"
    )]
    pub slack_bot_user_id: Option<String>,

    #[arg(
        long = "slack-api-base",
        env = "SRB_SLACK_API_BASE",
        help = "Slack Web API base URL [default: https://slack.com/api]"
    )]
    pub slack_api_base: Option<String>,

    #[arg(
        long = "slack-bot-name",
        env = "SRB_SLACK_BOT_NAME",
        help = "Display name used for posted notifications [default: Redmine Bot]"
    )]
    pub slack_bot_name: Option<String>,

    #[arg(
        long = "slack-icon-url",
        env = "SRB_SLACK_ICON_URL",
        help = "Icon URL used for posted notifications"
    )]
    pub slack_icon_url: Option<String>,

    #[arg(
        long = "request-timeout-ms",
        env = "SRB_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Timeout applied to every Redmine and Slack request"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "reconnect-delay-ms",
        env = "SRB_RECONNECT_DELAY_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Delay before reconnecting a dropped Slack socket"
    )]
    pub reconnect_delay_ms: u64,

    #[arg(
        long = "max-in-flight",
        env = "SRB_MAX_IN_FLIGHT",
        default_value_t = 0,
        help = "Maximum concurrently running notification workers (0 leaves it unbounded)"
    )]
    pub max_in_flight: usize,
}
