//! Optional `config.toml` discovery and decoding.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub(crate) const CONFIG_FILE_NAME: &str = "config.toml";
const SYSTEM_CONFIG_DIR: &str = "/etc/slack-redmine-bot";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub redmine: RedmineSection,
    pub slack: SlackSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RedmineSection {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub closed_statuses: Vec<u64>,
    pub high_priorities: Vec<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SlackSection {
    pub app_token: Option<String>,
    pub bot_token: Option<String>,
    pub api_base: Option<String>,
    pub bot_name: Option<String>,
    pub icon_url: Option<String>,
}

/// Directories searched for `config.toml`, most specific first.
pub(crate) fn config_search_dirs(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = Vec::with_capacity(3);
    if let Some(dir) = explicit {
        dirs.push(dir.to_path_buf());
    }
    dirs.push(PathBuf::from(SYSTEM_CONFIG_DIR));
    dirs.push(PathBuf::from("."));
    dirs
}

pub(crate) fn locate_config_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|path| path.is_file())
}

pub(crate) fn load_config_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Load the first `config.toml` found, if any.
pub(crate) fn discover_config(explicit: Option<&Path>) -> Result<Option<(PathBuf, FileConfig)>> {
    let Some(path) = locate_config_file(&config_search_dirs(explicit)) else {
        return Ok(None);
    };
    let config = load_config_file(&path)?;
    Ok(Some((path, config)))
}
