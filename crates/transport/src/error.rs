use {switchboard_common::RecipientKey, teloxide::RequestError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Admission was abandoned because the caller cancelled or its deadline passed.
    #[error("rate limited: admission cancelled while waiting{}", recipient_suffix(.recipient))]
    RateLimited { recipient: Option<RecipientKey> },

    #[error(transparent)]
    Telegram(#[from] RequestError),

    #[error("{message}")]
    Message { message: String },
}

fn recipient_suffix(recipient: &Option<RecipientKey>) -> String {
    recipient
        .as_ref()
        .map(|key| format!(" (recipient {key})"))
        .unwrap_or_default()
}

impl Error {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn rate_limited(recipient: Option<&RecipientKey>) -> Self {
        Self::RateLimited {
            recipient: recipient.cloned(),
        }
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
