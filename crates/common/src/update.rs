//! Accessors over [`Update`] that resolve the chat, user and message an event
//! originates from, regardless of which variant is populated.

use {
    serde::{Deserialize, Serialize},
    teloxide::types::{
        AllowedUpdate, Chat, MaybeInaccessibleMessage, Message, Update, UpdateKind, User,
    },
};

use crate::keys::SessionKey;

/// Chat the update belongs to, if any.
#[must_use]
pub fn effective_chat(update: &Update) -> Option<&Chat> {
    update.chat()
}

/// User that triggered the update, if any.
#[must_use]
pub fn effective_user(update: &Update) -> Option<&User> {
    update.from()
}

/// The message carried by the update: a (edited) message, a (edited) channel
/// post, or the still-accessible message a callback button was attached to.
#[must_use]
pub fn effective_message(update: &Update) -> Option<&Message> {
    match &update.kind {
        UpdateKind::Message(message)
        | UpdateKind::EditedMessage(message)
        | UpdateKind::ChannelPost(message)
        | UpdateKind::EditedChannelPost(message) => Some(message),
        UpdateKind::CallbackQuery(query) => match &query.message {
            Some(MaybeInaccessibleMessage::Regular(message)) => {
                let message: &Message = message;
                Some(message)
            },
            _ => None,
        },
        _ => None,
    }
}

/// Session key for the update: the chat id, else the sender's user id, else
/// [`SessionKey::UNSCOPED`].
#[must_use]
pub fn session_key(update: &Update) -> SessionKey {
    if let Some(chat) = effective_chat(update) {
        return chat.id.into();
    }
    effective_user(update)
        .and_then(|user| i64::try_from(user.id.0).ok())
        .map_or(SessionKey::UNSCOPED, SessionKey)
}

/// Text of the effective message (or its media caption).
#[must_use]
pub fn message_text(update: &Update) -> Option<&str> {
    effective_message(update).and_then(|m| m.text().or_else(|| m.caption()))
}

/// Kinds of update the platform can be asked to deliver.
///
/// Serialized names match the Bot API `allowed_updates` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    BusinessConnection,
    BusinessMessage,
    EditedBusinessMessage,
    DeletedBusinessMessages,
    MessageReaction,
    MessageReactionCount,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
    ChatBoost,
    RemovedChatBoost,
}

impl UpdateType {
    /// Platform name of this kind, as used in `allowed_updates`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::BusinessConnection => "business_connection",
            Self::BusinessMessage => "business_message",
            Self::EditedBusinessMessage => "edited_business_message",
            Self::DeletedBusinessMessages => "deleted_business_messages",
            Self::MessageReaction => "message_reaction",
            Self::MessageReactionCount => "message_reaction_count",
            Self::InlineQuery => "inline_query",
            Self::ChosenInlineResult => "chosen_inline_result",
            Self::CallbackQuery => "callback_query",
            Self::ShippingQuery => "shipping_query",
            Self::PreCheckoutQuery => "pre_checkout_query",
            Self::Poll => "poll",
            Self::PollAnswer => "poll_answer",
            Self::MyChatMember => "my_chat_member",
            Self::ChatMember => "chat_member",
            Self::ChatJoinRequest => "chat_join_request",
            Self::ChatBoost => "chat_boost",
            Self::RemovedChatBoost => "removed_chat_boost",
        }
    }

    /// The teloxide filter value for this kind, when the client library knows it.
    #[must_use]
    pub fn to_allowed(self) -> Option<AllowedUpdate> {
        Some(match self {
            Self::Message => AllowedUpdate::Message,
            Self::EditedMessage => AllowedUpdate::EditedMessage,
            Self::ChannelPost => AllowedUpdate::ChannelPost,
            Self::EditedChannelPost => AllowedUpdate::EditedChannelPost,
            Self::InlineQuery => AllowedUpdate::InlineQuery,
            Self::ChosenInlineResult => AllowedUpdate::ChosenInlineResult,
            Self::CallbackQuery => AllowedUpdate::CallbackQuery,
            Self::ShippingQuery => AllowedUpdate::ShippingQuery,
            Self::PreCheckoutQuery => AllowedUpdate::PreCheckoutQuery,
            Self::Poll => AllowedUpdate::Poll,
            Self::PollAnswer => AllowedUpdate::PollAnswer,
            Self::MyChatMember => AllowedUpdate::MyChatMember,
            Self::ChatMember => AllowedUpdate::ChatMember,
            Self::ChatJoinRequest => AllowedUpdate::ChatJoinRequest,
            _ => return None,
        })
    }

    /// Kind of a received update. `None` for kinds this crate does not name.
    #[must_use]
    pub fn of(update: &Update) -> Option<Self> {
        Some(match &update.kind {
            UpdateKind::Message(_) => Self::Message,
            UpdateKind::EditedMessage(_) => Self::EditedMessage,
            UpdateKind::ChannelPost(_) => Self::ChannelPost,
            UpdateKind::EditedChannelPost(_) => Self::EditedChannelPost,
            UpdateKind::InlineQuery(_) => Self::InlineQuery,
            UpdateKind::ChosenInlineResult(_) => Self::ChosenInlineResult,
            UpdateKind::CallbackQuery(_) => Self::CallbackQuery,
            UpdateKind::ShippingQuery(_) => Self::ShippingQuery,
            UpdateKind::PreCheckoutQuery(_) => Self::PreCheckoutQuery,
            UpdateKind::Poll(_) => Self::Poll,
            UpdateKind::PollAnswer(_) => Self::PollAnswer,
            UpdateKind::MyChatMember(_) => Self::MyChatMember,
            UpdateKind::ChatMember(_) => Self::ChatMember,
            UpdateKind::ChatJoinRequest(_) => Self::ChatJoinRequest,
            _ => return None,
        })
    }
}

/// Short name of the update's kind for log fields.
#[must_use]
pub fn kind_name(update: &Update) -> &'static str {
    UpdateType::of(update).map_or("other", UpdateType::as_str)
}
