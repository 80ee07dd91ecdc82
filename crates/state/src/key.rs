use std::{fmt, sync::Arc};

use {
    switchboard_common::update::{effective_chat, effective_user},
    teloxide::types::Update,
};

/// Identifies one conversation's stored state: a named conversation, for one
/// user, in one chat. Missing identities are recorded as zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersistenceKey {
    pub conversation_id: Arc<str>,
    pub user_id: u64,
    pub chat_id: i64,
}

impl PersistenceKey {
    #[must_use]
    pub fn new(conversation_id: impl Into<Arc<str>>, user_id: u64, chat_id: i64) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id,
            chat_id,
        }
    }

    #[must_use]
    pub fn for_update(conversation_id: impl Into<Arc<str>>, update: &Update) -> Self {
        Self::new(
            conversation_id,
            effective_user(update).map_or(0, |user| user.id.0),
            effective_chat(update).map_or(0, |chat| chat.id.0),
        )
    }
}

impl fmt::Display for PersistenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.conversation_id, self.user_id, self.chat_id)
    }
}

#[cfg(test)]
mod tests {
    use switchboard_common::fixtures;

    use super::*;

    #[test]
    fn key_from_group_message_uses_user_and_chat() {
        let update = fixtures::group_text(-100, 7, "hi");
        let key = PersistenceKey::for_update("signup", &update);
        assert_eq!(key, PersistenceKey::new("signup", 7, -100));
        assert_eq!(key.to_string(), "signup:7:-100");
    }

    #[test]
    fn inline_query_has_no_chat() {
        let update = fixtures::inline_query(3, "q");
        let key = PersistenceKey::for_update("c", &update);
        assert_eq!((key.user_id, key.chat_id), (3, 0));
    }
}
