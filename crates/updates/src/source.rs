use {teloxide::types::Update, tokio::sync::mpsc, tokio_util::sync::CancellationToken};

use crate::{error::Result, polling::Poller, webhook::WebhookListener};

/// Where updates come from. The two modes are mutually exclusive: Telegram
/// refuses `getUpdates` while a webhook is registered.
pub enum UpdateSource {
    Polling(Poller),
    Webhook(WebhookListener),
}

impl UpdateSource {
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Polling(_) => "polling",
            Self::Webhook(_) => "webhook",
        }
    }

    /// Feed updates into `sink` until cancelled or the source fails.
    pub async fn run(&self, cancel: CancellationToken, sink: mpsc::Sender<Update>) -> Result<()> {
        match self {
            Self::Polling(poller) => poller.run(cancel, sink).await,
            Self::Webhook(listener) => listener.serve(cancel, sink).await,
        }
    }
}
