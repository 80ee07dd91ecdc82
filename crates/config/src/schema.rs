//! Config schema. Every section has serde defaults, so an empty file is a
//! valid (if tokenless) configuration.

use std::{net::SocketAddr, path::PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    switchboard_common::update::UpdateType,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub telegram: TelegramConfig,
    pub rate_limit: RateLimitSettings,
    pub updates: UpdatesConfig,
    pub state: StateConfig,
    pub access: AccessConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token. Redacted in `Debug` output.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
    /// The bot's own username, without `@`. Needed to accept
    /// `/cmd@username` commands.
    pub username: Option<String>,
}

/// Outbound rate limits. A rate of zero disables that limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub global_per_sec: u32,
    pub global_burst: u32,
    pub recipient_per_min: u32,
    pub recipient_burst: u32,
    /// Per-recipient state that has been idle this long is dropped.
    pub recipient_idle_ttl_secs: u64,
    pub max_recipients: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            global_per_sec: 30,
            global_burst: 10,
            recipient_per_min: 20,
            recipient_burst: 1,
            recipient_idle_ttl_secs: 600,
            max_recipients: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    #[default]
    Polling,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatesConfig {
    pub mode: UpdateMode,
    /// Long-poll timeout in seconds.
    pub poll_timeout_secs: u32,
    /// Discard updates queued while the bot was offline.
    pub drop_pending: bool,
    /// Update kinds to request. Empty means the platform default.
    pub allowed: Vec<UpdateType>,
    pub webhook: WebhookConfig,
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            mode: UpdateMode::Polling,
            poll_timeout_secs: 30,
            drop_pending: false,
            allowed: vec![UpdateType::Message, UpdateType::CallbackQuery],
            webhook: WebhookConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Public HTTPS URL registered with the platform.
    pub url: Option<String>,
    /// Local address the HTTP listener binds to.
    pub listen: SocketAddr,
    pub path: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` value.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub secret: Option<Secret<String>>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            listen: SocketAddr::from(([0, 0, 0, 0], 8443)),
            path: "/telegram/webhook".into(),
            secret: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub backend: StateBackend,
    /// SQLite database file. Defaults to `conversations.db` in the data
    /// directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Chats the bot serves. Updates from any other chat are ignored.
    pub allowed_chats: Vec<i64>,
}

impl AccessConfig {
    #[must_use]
    pub fn allows(&self, chat_id: i64) -> bool {
        self.allowed_chats.contains(&chat_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
