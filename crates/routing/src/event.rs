use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    switchboard_common::update::{effective_chat, effective_message, effective_user, message_text},
    teloxide::types::{Chat, Message, Update, User},
    tokio_util::sync::CancellationToken,
};

use crate::{
    conversation::{ConversationContext, Selection},
    error::{Error, Result},
};

/// One update as seen by filters and handlers.
///
/// Cheap to clone. `cancel` is the process shutdown token; long-running
/// handlers should watch it.
#[derive(Clone)]
pub struct Event {
    pub update: Arc<Update>,
    /// The bot's own username, used to tell `/cmd@this_bot` from commands
    /// addressed to other bots.
    pub bot_username: Option<Arc<str>>,
    pub cancel: CancellationToken,
    conversation: Option<Arc<ConversationContext>>,
    /// Conversation routes that matched this event, by conversation id.
    selections: Arc<Mutex<HashMap<Arc<str>, Selection>>>,
}

impl Event {
    #[must_use]
    pub fn new(update: Arc<Update>, bot_username: Option<Arc<str>>, cancel: CancellationToken) -> Self {
        Self {
            update,
            bot_username,
            cancel,
            conversation: None,
            selections: Arc::default(),
        }
    }

    #[must_use]
    pub fn chat(&self) -> Option<&Chat> {
        effective_chat(&self.update)
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        effective_user(&self.update)
    }

    #[must_use]
    pub fn message(&self) -> Option<&Message> {
        effective_message(&self.update)
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        message_text(&self.update)
    }

    /// Words after the command in `/cmd a b`.
    #[must_use]
    pub fn command_args(&self) -> Vec<&str> {
        self.text()
            .filter(|text| text.starts_with('/'))
            .map(|text| text.split_whitespace().skip(1).collect())
            .unwrap_or_default()
    }

    /// State handle for the conversation this event is being handled in.
    pub fn conversation(&self) -> Result<&ConversationContext> {
        self.conversation.as_deref().ok_or(Error::NoConversation)
    }

    #[must_use]
    pub(crate) fn with_conversation(&self, context: Arc<ConversationContext>) -> Self {
        Self {
            conversation: Some(context),
            ..self.clone()
        }
    }

    pub(crate) fn remember_selection(&self, conversation: Arc<str>, selection: Selection) {
        self.selections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conversation, selection);
    }

    pub(crate) fn take_selection(&self, conversation: &str) -> Option<Selection> {
        self.selections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(conversation)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("update_id", &self.update.id.0)
            .field("bot_username", &self.bot_username)
            .field("conversation", &self.conversation.as_ref().map(|c| c.key()))
            .finish()
    }
}
