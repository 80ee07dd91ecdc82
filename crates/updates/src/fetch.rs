//! The long-poll round trip, behind a trait so the polling loop can be driven
//! without the network.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    switchboard_common::update::UpdateType,
    switchboard_transport::AdmissionControl,
    teloxide::{
        payloads::{DeleteWebhookSetters, GetUpdatesSetters},
        prelude::*,
        types::AllowedUpdate,
    },
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use crate::error::{Error, Result};

/// Extra headroom on the HTTP client timeout over the long-poll timeout, so the
/// client never aborts a request Telegram is still holding open.
const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(15);

/// One `getUpdates` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub timeout_secs: u32,
    pub offset: i32,
    /// Empty means whatever the platform delivers by default.
    pub allowed: Vec<UpdateType>,
}

#[async_trait]
pub trait UpdateFetcher: Send + Sync {
    /// Fetch the next batch, in increasing update id order.
    async fn fetch(&self, cancel: &CancellationToken, request: &FetchRequest)
    -> Result<Vec<Update>>;

    /// Remove any registered webhook so long polling is accepted.
    async fn delete_webhook(&self, drop_pending: bool) -> Result<()>;
}

/// Build a bot whose HTTP client outlasts a long poll of `poll_timeout`.
pub fn build_bot(token: &str, poll_timeout: Duration) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(poll_timeout + CLIENT_TIMEOUT_MARGIN)
        .build()
        .map_err(Error::http_client)?;
    Ok(Bot::with_client(token, client))
}

pub(crate) fn allowed_updates(kinds: &[UpdateType]) -> Vec<AllowedUpdate> {
    kinds.iter().filter_map(|kind| kind.to_allowed()).collect()
}

/// Fetches through the Bot API. When admission control is attached, each
/// round trip takes a global token first.
#[derive(Clone)]
pub struct TelegramFetcher {
    bot: Bot,
    admission: Option<Arc<AdmissionControl>>,
}

impl TelegramFetcher {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            admission: None,
        }
    }

    #[must_use]
    pub fn with_admission(mut self, admission: Arc<AdmissionControl>) -> Self {
        self.admission = Some(admission);
        self
    }
}

#[async_trait]
impl UpdateFetcher for TelegramFetcher {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        request: &FetchRequest,
    ) -> Result<Vec<Update>> {
        if let Some(admission) = &self.admission {
            admission.acquire(cancel, None).await?;
        }

        let mut call = self
            .bot
            .get_updates()
            .offset(request.offset)
            .timeout(request.timeout_secs);
        if !request.allowed.is_empty() {
            call = call.allowed_updates(allowed_updates(&request.allowed));
        }
        let updates = call.await?;

        debug!(
            offset = request.offset,
            count = updates.len(),
            "fetched telegram updates"
        );
        Ok(updates)
    }

    async fn delete_webhook(&self, drop_pending: bool) -> Result<()> {
        self.bot
            .delete_webhook()
            .drop_pending_updates(drop_pending)
            .await?;
        Ok(())
    }
}
