use teloxide::RequestError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A long-poll round trip failed. The polling loop stops on this and the
    /// caller decides whether to start it again.
    #[error("fetching updates failed at offset {offset}")]
    FetchFailed {
        offset: i32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("webhook payload could not be decoded")]
    WebhookDecode {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The dispatch side hung up.
    #[error("update sink closed")]
    SinkClosed,

    #[error("invalid webhook url: {url}")]
    InvalidUrl { url: String },

    #[error(transparent)]
    Telegram(#[from] RequestError),

    #[error(transparent)]
    Transport(#[from] switchboard_transport::Error),

    /// The HTTP client behind the bot could not be built.
    #[error("http client could not be built")]
    HttpClient {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn fetch_failed(
        offset: i32,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::FetchFailed {
            offset,
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn http_client(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::HttpClient {
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn webhook_decode(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::WebhookDecode {
            source: Box::new(source),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
