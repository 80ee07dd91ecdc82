//! Identity keys shared by the dispatcher, the router and the transport.

use std::{fmt, str::FromStr, sync::Arc};

use {
    serde::{Deserialize, Serialize},
    teloxide::types::{ChatId, Recipient},
};

use crate::error::Error;

/// The chat identity a session handler is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(pub i64);

impl SessionKey {
    /// Key used for updates that carry neither a chat nor a user.
    pub const UNSCOPED: Self = Self(0);

    #[must_use]
    pub fn chat_id(self) -> ChatId {
        ChatId(self.0)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ChatId> for SessionKey {
    fn from(id: ChatId) -> Self {
        Self(id.0)
    }
}

/// Key of a per-recipient rate-limit scope.
///
/// Numeric chat ids and `@channel` usernames share one keyspace; the
/// canonical form is the decimal id or the username including the `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipientKey(Arc<str>);

impl RecipientKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ChatId> for RecipientKey {
    fn from(id: ChatId) -> Self {
        Self(Arc::from(id.0.to_string()))
    }
}

impl From<SessionKey> for RecipientKey {
    fn from(key: SessionKey) -> Self {
        key.chat_id().into()
    }
}

impl From<&Recipient> for RecipientKey {
    fn from(recipient: &Recipient) -> Self {
        match recipient {
            Recipient::Id(id) => (*id).into(),
            Recipient::ChannelUsername(name) => Self(Arc::from(name.as_str())),
        }
    }
}

impl FromStr for RecipientKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let valid = if let Some(name) = trimmed.strip_prefix('@') {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        } else {
            trimmed.parse::<i64>().is_ok()
        };
        if !valid {
            return Err(Error::InvalidIdentifier {
                kind: "recipient",
                value: s.to_owned(),
            });
        }
        Ok(Self(Arc::from(trimmed)))
    }
}
