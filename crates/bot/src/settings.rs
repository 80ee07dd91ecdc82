//! Translation from the config file schema to each crate's runtime settings.

use std::{path::Path, sync::Arc, time::Duration};

use {
    switchboard_config::{RateLimitSettings, StateBackend, SwitchboardConfig, UpdatesConfig},
    switchboard_state::{ConversationStore, MemoryConversationStore, SqliteConversationStore},
    switchboard_transport::{BucketConfig, RateLimitConfig},
    switchboard_updates::PollingConfig,
    tracing::info,
};

use crate::error::{Error, Result};

#[must_use]
pub fn rate_limit_config(settings: &RateLimitSettings) -> RateLimitConfig {
    RateLimitConfig {
        global: BucketConfig::per_second(settings.global_per_sec, settings.global_burst),
        per_recipient: BucketConfig::per_minute(
            settings.recipient_per_min,
            settings.recipient_burst,
        ),
        recipient_idle_ttl: Duration::from_secs(settings.recipient_idle_ttl_secs),
        max_recipients: settings.max_recipients,
    }
}

#[must_use]
pub fn polling_config(updates: &UpdatesConfig) -> PollingConfig {
    PollingConfig {
        timeout_secs: updates.poll_timeout_secs,
        drop_pending: updates.drop_pending,
        allowed: updates.allowed.clone(),
    }
}

/// Open the configured conversation store. SQLite databases and their parent
/// directories are created on first use.
pub async fn open_conversation_store(
    config: &SwitchboardConfig,
) -> Result<Arc<dyn ConversationStore>> {
    match config.state.backend {
        StateBackend::Memory => {
            info!(backend = "memory", "conversation store opened");
            Ok(Arc::new(MemoryConversationStore::new()))
        },
        StateBackend::Sqlite => {
            let path = switchboard_config::state_db_path(config);
            let store = open_sqlite(&path).await?;
            info!(backend = "sqlite", path = %path.display(), "conversation store opened");
            Ok(Arc::new(store))
        },
    }
}

async fn open_sqlite(path: &Path) -> Result<SqliteConversationStore> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let url = format!("sqlite:{}?mode=rwc", path.display());
    Ok(SqliteConversationStore::new(&url).await?)
}
