//! SQLite-backed conversation store using sqlx.

use std::time::{SystemTime, UNIX_EPOCH};

use {
    async_trait::async_trait,
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

use crate::{
    error::Result,
    key::PersistenceKey,
    store::{ConversationData, ConversationStore},
};

/// Create the `conversations` table. Call before [`SqliteConversationStore::with_pool`].
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Open (creating if needed) the database at `database_url` and migrate it.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        run_migrations(&pool).await?;
        debug!(database_url, "conversation store ready");
        Ok(Self { pool })
    }

    /// Use an existing, already migrated pool.
    #[must_use]
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get_state(&self, key: &PersistenceKey) -> Result<String> {
        let state = sqlx::query_scalar::<_, String>(
            "SELECT state FROM conversations \
             WHERE conversation_id = ? AND user_id = ? AND chat_id = ?",
        )
        .bind(key.conversation_id.as_ref())
        .bind(key.user_id as i64)
        .bind(key.chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(state.unwrap_or_default())
    }

    async fn set_state(&self, key: &PersistenceKey, state: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO conversations (conversation_id, user_id, chat_id, state, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(conversation_id, user_id, chat_id) DO UPDATE SET
                 state = excluded.state,
                 updated_at = excluded.updated_at"#,
        )
        .bind(key.conversation_id.as_ref())
        .bind(key.user_id as i64)
        .bind(key.chat_id)
        .bind(state)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_data(&self, key: &PersistenceKey) -> Result<ConversationData> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT data FROM conversations \
             WHERE conversation_id = ? AND user_id = ? AND chat_id = ?",
        )
        .bind(key.conversation_id.as_ref())
        .bind(key.user_id as i64)
        .bind(key.chat_id)
        .fetch_optional(&self.pool)
        .await?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(ConversationData::new()),
        }
    }

    async fn set_data(&self, key: &PersistenceKey, data: ConversationData) -> Result<()> {
        let raw = serde_json::to_string(&data)?;
        sqlx::query(
            r#"INSERT INTO conversations (conversation_id, user_id, chat_id, data, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(conversation_id, user_id, chat_id) DO UPDATE SET
                 data = excluded.data,
                 updated_at = excluded.updated_at"#,
        )
        .bind(key.conversation_id.as_ref())
        .bind(key.user_id as i64)
        .bind(key.chat_id)
        .bind(raw)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_data(&self, key: &PersistenceKey) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET data = '{}', updated_at = ? \
             WHERE conversation_id = ? AND user_id = ? AND chat_id = ?",
        )
        .bind(now_ms())
        .bind(key.conversation_id.as_ref())
        .bind(key.user_id as i64)
        .bind(key.chat_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
