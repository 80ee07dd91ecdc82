use std::{
    collections::{BTreeMap, HashMap},
    sync::RwLock,
};

use {async_trait::async_trait, serde_json::Value};

use crate::{error::Result, key::PersistenceKey};

/// Free-form per-conversation data, ordered by key.
pub type ConversationData = BTreeMap<String, Value>;

/// State and data for one conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationRecord {
    /// Empty means no conversation is active.
    pub state: String,
    pub data: ConversationData,
}

/// Storage for conversation records.
///
/// Implementations must tolerate concurrent calls for different keys. Writes
/// to the same key are last-write-wins.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Current state, or `""` if none was ever set.
    async fn get_state(&self, key: &PersistenceKey) -> Result<String>;

    async fn set_state(&self, key: &PersistenceKey, state: &str) -> Result<()>;

    /// Current data, or an empty map.
    async fn get_data(&self, key: &PersistenceKey) -> Result<ConversationData>;

    async fn set_data(&self, key: &PersistenceKey, data: ConversationData) -> Result<()>;

    /// Empty the data map. The state is left as is.
    async fn clear_data(&self, key: &PersistenceKey) -> Result<()>;
}

/// In-process store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    records: RwLock<HashMap<PersistenceKey, ConversationRecord>>,
}

impl MemoryConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn record(&self, key: &PersistenceKey) -> Option<ConversationRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get_state(&self, key: &PersistenceKey) -> Result<String> {
        Ok(self.record(key).map(|r| r.state).unwrap_or_default())
    }

    async fn set_state(&self, key: &PersistenceKey, state: &str) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.entry(key.clone()).or_default().state = state.to_string();
        Ok(())
    }

    async fn get_data(&self, key: &PersistenceKey) -> Result<ConversationData> {
        Ok(self.record(key).map(|r| r.data).unwrap_or_default())
    }

    async fn set_data(&self, key: &PersistenceKey, data: ConversationData) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.entry(key.clone()).or_default().data = data;
        Ok(())
    }

    async fn clear_data(&self, key: &PersistenceKey) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = records.get_mut(key) {
            record.data.clear();
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn key(user: u64) -> PersistenceKey {
        PersistenceKey::new("signup", user, 10)
    }

    #[tokio::test]
    async fn unknown_key_has_empty_state_and_data() {
        let store = MemoryConversationStore::new();
        assert_eq!(store.get_state(&key(1)).await.unwrap(), "");
        assert!(store.get_data(&key(1)).await.unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clear_data_keeps_state() {
        let store = MemoryConversationStore::new();
        let k = key(1);
        store.set_state(&k, "ask_email").await.unwrap();
        store
            .set_data(&k, ConversationData::from([("name".into(), json!("Ada"))]))
            .await
            .unwrap();

        store.clear_data(&k).await.unwrap();
        assert_eq!(store.get_state(&k).await.unwrap(), "ask_email");
        assert!(store.get_data(&k).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = MemoryConversationStore::new();
        store.set_state(&key(1), "a").await.unwrap();
        store.set_state(&key(2), "b").await.unwrap();
        assert_eq!(store.get_state(&key(1)).await.unwrap(), "a");
        assert_eq!(store.get_state(&key(2)).await.unwrap(), "b");
        assert_eq!(
            store
                .get_state(&PersistenceKey::new("other", 1, 10))
                .await
                .unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn concurrent_writers_on_distinct_keys() {
        let store = Arc::new(MemoryConversationStore::new());
        let tasks: Vec<_> = (0..32u64)
            .map(|user| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .set_state(&key(user), &format!("s{user}"))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.len(), 32);
        assert_eq!(store.get_state(&key(17)).await.unwrap(), "s17");
    }
}
