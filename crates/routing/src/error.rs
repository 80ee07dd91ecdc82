use switchboard_service_traits::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No route accepted the event. Routers escalate this to their not-found
    /// handler; groups and conversations return it so an outer router can.
    #[error("route not found")]
    RouteNotFound,

    /// The handler asked for conversation state outside a conversation route.
    #[error("no conversation is active for this event")]
    NoConversation,

    #[error("handler panicked: {message}")]
    PanicRecovered { message: String },

    #[error("invalid route pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error(transparent)]
    Store(#[from] switchboard_state::Error),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RouteNotFound)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
