//! Resolves CLI, environment and config-file values into the runtime config.

use std::time::Duration;

use anyhow::{bail, Result};
use srb_slack_runtime::{BotIdentity, SlackBridgeRuntimeConfig};
use tracing::{debug, info};

use crate::cli_args::Cli;
use crate::config_file::{discover_config, FileConfig};

const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

pub(crate) fn resolve_runtime_config(cli: &Cli) -> Result<SlackBridgeRuntimeConfig> {
    let file = match discover_config(cli.config.as_deref())? {
        Some((path, file)) => {
            info!(path = %path.display(), "loaded config file");
            file
        }
        None => {
            debug!("no config file found, using flags and environment only");
            FileConfig::default()
        }
    };
    build_runtime_config(cli, file)
}

/// Flag or environment value first, then the config file, then the built-in default.
pub(crate) fn build_runtime_config(
    cli: &Cli,
    file: FileConfig,
) -> Result<SlackBridgeRuntimeConfig> {
    let FileConfig { redmine, slack } = file;

    let redmine_url = required(
        cli.redmine_url.as_deref(),
        redmine.url,
        "--redmine-url / SRB_REDMINE_URL / [redmine].url",
    )?;
    let redmine_api_key = required(
        cli.redmine_api_key.as_deref(),
        redmine.api_key,
        "--redmine-api-key / SRB_REDMINE_API_KEY / [redmine].api_key",
    )?;
    let app_token = required(
        cli.slack_app_token.as_deref(),
        slack.app_token,
        "--slack-app-token / SRB_SLACK_APP_TOKEN / [slack].app_token",
    )?;
    let bot_token = required(
        cli.slack_bot_token.as_deref(),
        slack.bot_token,
        "--slack-bot-token / SRB_SLACK_BOT_TOKEN / [slack].bot_token",
    )?;

    let defaults = BotIdentity::default();
    let bot_identity = BotIdentity {
        username: optional(cli.slack_bot_name.as_deref(), slack.bot_name)
            .unwrap_or(defaults.username),
        icon_url: optional(cli.slack_icon_url.as_deref(), slack.icon_url).or(defaults.icon_url),
    };

    Ok(SlackBridgeRuntimeConfig {
        redmine_url,
        redmine_api_key,
        closed_status_ids: id_list(&cli.redmine_closed_statuses, redmine.closed_statuses),
        high_priority_ids: id_list(&cli.redmine_high_priorities, redmine.high_priorities),
        api_base: optional(cli.slack_api_base.as_deref(), slack.api_base)
            .unwrap_or_else(|| DEFAULT_SLACK_API_BASE.to_string()),
        app_token,
        bot_token,
        bot_user_id: optional(cli.slack_bot_user_id.as_deref(), None),
        bot_identity,
        request_timeout_ms: cli.request_timeout_ms,
        reconnect_delay: Duration::from_millis(cli.reconnect_delay_ms),
        max_in_flight: cli.max_in_flight,
    })
}

fn optional(flag: Option<&str>, file: Option<String>) -> Option<String> {
    flag.map(str::to_string)
        .into_iter()
        .chain(file)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn required(flag: Option<&str>, file: Option<String>, source: &str) -> Result<String> {
    match optional(flag, file) {
        Some(value) => Ok(value),
        None => bail!("missing required setting {source}"),
    }
}

fn id_list(flag: &[u64], file: Vec<u64>) -> Vec<u64> {
    if flag.is_empty() {
        file
    } else {
        flag.to_vec()
    }
}
