use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, info},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::SwitchboardConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "switchboard.toml",
    "switchboard.yaml",
    "switchboard.yml",
    "switchboard.json",
];

pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const GLOBAL_RATE_ENV: &str = "SWITCHBOARD_RATE_GLOBAL_PER_SEC";
pub const RECIPIENT_RATE_ENV: &str = "SWITCHBOARD_RATE_RECIPIENT_PER_MIN";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SwitchboardConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./switchboard.{toml,yaml,yml,json}` (project-local)
/// 2. `<user config dir>/switchboard/switchboard.{toml,yaml,yml,json}`
///
/// Returns `SwitchboardConfig::default()` if no config file is found. A file
/// that exists but does not parse is an error.
pub fn discover_and_load() -> Result<SwitchboardConfig> {
    match discover_config() {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            load_config(&path)
        },
        None => {
            debug!("no config file found, using defaults");
            Ok(SwitchboardConfig::default())
        },
    }
}

/// Find the first config file in standard locations.
#[must_use]
pub fn discover_config() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|path| path.exists())
}

/// Returns the user-global config directory (e.g. `~/.config/switchboard/`).
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "switchboard").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user-global data directory, home of the SQLite state file.
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "switchboard").map(|d| d.data_dir().to_path_buf())
}

/// Path of the SQLite conversation store: the configured one, or
/// `conversations.db` in the data directory.
#[must_use]
pub fn state_db_path(config: &SwitchboardConfig) -> PathBuf {
    config.state.path.clone().unwrap_or_else(|| {
        data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conversations.db")
    })
}

/// Apply process environment overrides on top of a loaded config.
///
/// - `TELEGRAM_BOT_TOKEN` fills in the token when the file has none.
/// - `SWITCHBOARD_RATE_GLOBAL_PER_SEC` and `SWITCHBOARD_RATE_RECIPIENT_PER_MIN`
///   replace the configured rates.
pub fn apply_env_overrides(config: SwitchboardConfig) -> Result<SwitchboardConfig> {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: SwitchboardConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SwitchboardConfig> {
    if config.telegram.token.is_none()
        && let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.is_empty())
    {
        config.telegram.token = Some(Secret::new(token));
    }
    if let Some(rate) = parse_rate(GLOBAL_RATE_ENV, &lookup)? {
        debug!(rate, "global rate overridden from environment");
        config.rate_limit.global_per_sec = rate;
    }
    if let Some(rate) = parse_rate(RECIPIENT_RATE_ENV, &lookup)? {
        debug!(rate, "recipient rate overridden from environment");
        config.rate_limit.recipient_per_min = rate;
    }
    Ok(config)
}

fn parse_rate(name: &'static str, lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<u32>> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| Error::InvalidEnv { name, value })
}

fn parse_config(raw: &str, path: &Path) -> Result<SwitchboardConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}
