use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("telegram.token is not set")]
    MissingToken,

    #[error("webhook mode needs updates.webhook.url")]
    MissingWebhookUrl,

    #[error(transparent)]
    Config(#[from] switchboard_config::Error),

    #[error(transparent)]
    Updates(#[from] switchboard_updates::Error),

    #[error(transparent)]
    State(#[from] switchboard_state::Error),

    #[error(transparent)]
    Transport(#[from] switchboard_transport::Error),

    #[error("failed to create {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
