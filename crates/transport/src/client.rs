use std::{future::Future, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    switchboard_common::RecipientKey,
    switchboard_service_traits::{
        BotCommand, ChatClient, EditMessage, KeyboardButton, MarkupMode, OutboundMessage,
        SentMessage, ServiceError, ServiceResult,
    },
    teloxide::{
        RequestError,
        payloads::{EditMessageTextSetters, SendMessageSetters},
        prelude::*,
        types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode, ReplyParameters},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use switchboard_metrics::{counter, labels, transport as transport_metrics};

use crate::{
    admission::AdmissionControl,
    error::{Error, Result},
};

const RETRY_AFTER_MAX_RETRIES: usize = 3;

/// Bot API client whose every request is admitted by [`AdmissionControl`].
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    admission: Arc<AdmissionControl>,
    cancel: CancellationToken,
}

impl TelegramTransport {
    /// `cancel` is the process shutdown token; it aborts admission waits and
    /// flood-control sleeps.
    #[must_use]
    pub fn new(bot: Bot, admission: Arc<AdmissionControl>, cancel: CancellationToken) -> Self {
        Self {
            bot,
            admission,
            cancel,
        }
    }

    #[must_use]
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    #[must_use]
    pub fn admission(&self) -> &Arc<AdmissionControl> {
        &self.admission
    }

    /// Run one Bot API call: wait for admission, send, and wait out
    /// `RetryAfter` replies a bounded number of times. Each retry is
    /// admitted again.
    pub async fn run_request<T, F, Fut>(
        &self,
        operation: &'static str,
        recipient: Option<&RecipientKey>,
        mut request: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            self.admission.acquire(&self.cancel, recipient).await?;

            #[cfg(feature = "metrics")]
            counter!(transport_metrics::REQUESTS_TOTAL, labels::METHOD => operation).increment(1);

            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    #[cfg(feature = "metrics")]
                    counter!(transport_metrics::REQUEST_ERRORS_TOTAL, labels::METHOD => operation)
                        .increment(1);

                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err.into());
                    };

                    if retries >= RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            recipient = recipient.map(RecipientKey::as_str),
                            operation,
                            retries,
                            retry_after_secs = wait.as_secs(),
                            "telegram flood control persisted after retries"
                        );
                        return Err(err.into());
                    }

                    retries += 1;
                    warn!(
                        recipient = recipient.map(RecipientKey::as_str),
                        operation,
                        retries,
                        max_retries = RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram flood control, waiting before retry"
                    );

                    #[cfg(feature = "metrics")]
                    counter!(transport_metrics::RETRY_AFTER_TOTAL).increment(1);

                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return Err(Error::rate_limited(recipient)),
                        () = tokio::time::sleep(wait) => {},
                    }
                },
            }
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn parse_mode(markup: MarkupMode) -> Option<ParseMode> {
    match markup {
        MarkupMode::Plain => None,
        MarkupMode::Html => Some(ParseMode::Html),
        MarkupMode::MarkdownV2 => Some(ParseMode::MarkdownV2),
    }
}

fn inline_keyboard(rows: &[Vec<KeyboardButton>]) -> Option<InlineKeyboardMarkup> {
    if rows.is_empty() {
        return None;
    }
    let buttons: Vec<Vec<InlineKeyboardButton>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineKeyboardButton::callback(b.text.clone(), b.callback_data.clone()))
                .collect()
        })
        .collect();
    Some(InlineKeyboardMarkup::new(buttons))
}

impl From<Error> for ServiceError {
    fn from(err: Error) -> Self {
        ServiceError::external("telegram transport", err)
    }
}

#[async_trait]
impl ChatClient for TelegramTransport {
    async fn send(&self, message: OutboundMessage) -> ServiceResult<SentMessage> {
        let recipient = RecipientKey::from(message.recipient);
        let parse_mode = parse_mode(message.markup);
        let keyboard = inline_keyboard(&message.keyboard);
        let reply = message
            .reply_to
            .map(|id| ReplyParameters::new(id).allow_sending_without_reply());

        let sent = self
            .run_request("send_message", Some(&recipient), || {
                let mut req = self.bot.send_message(message.recipient, message.text.clone());
                if let Some(mode) = parse_mode {
                    req = req.parse_mode(mode);
                }
                if let Some(rp) = reply.clone() {
                    req = req.reply_parameters(rp);
                }
                if let Some(markup) = keyboard.clone() {
                    req = req.reply_markup(markup);
                }
                async move { req.await }
            })
            .await?;

        debug!(
            chat_id = message.recipient.0,
            message_id = sent.id.0,
            text_len = message.text.len(),
            "message sent"
        );
        Ok(SentMessage {
            chat_id: sent.chat.id,
            message_id: sent.id,
        })
    }

    async fn edit(&self, edit: EditMessage) -> ServiceResult<SentMessage> {
        let recipient = RecipientKey::from(edit.recipient);
        let parse_mode = parse_mode(edit.markup);
        let keyboard = inline_keyboard(&edit.keyboard);

        let edited = self
            .run_request("edit_message_text", Some(&recipient), || {
                let mut req =
                    self.bot
                        .edit_message_text(edit.recipient, edit.message_id, edit.text.clone());
                if let Some(mode) = parse_mode {
                    req = req.parse_mode(mode);
                }
                if let Some(markup) = keyboard.clone() {
                    req = req.reply_markup(markup);
                }
                async move { req.await }
            })
            .await?;

        Ok(SentMessage {
            chat_id: edited.chat.id,
            message_id: edited.id,
        })
    }

    async fn set_commands(&self, commands: Vec<BotCommand>) -> ServiceResult {
        let commands: Vec<teloxide::types::BotCommand> = commands
            .into_iter()
            .map(|c| teloxide::types::BotCommand::new(c.command, c.description))
            .collect();
        self.run_request("set_my_commands", None, || {
            let req = self.bot.set_my_commands(commands.clone());
            async move { req.await }
        })
        .await?;
        debug!(count = commands.len(), "bot commands registered");
        Ok(())
    }
}
