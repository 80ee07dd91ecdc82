//! Inbound update ingestion, by long polling or webhook.
//!
//! Both modes push decoded updates into an `mpsc` channel that the session
//! dispatcher drains.

pub mod error;
pub mod fetch;
pub mod polling;
pub mod source;
pub mod webhook;

pub use {
    error::{Error, Result},
    fetch::{FetchRequest, TelegramFetcher, UpdateFetcher, build_bot},
    polling::{Poller, PollingConfig},
    source::UpdateSource,
    webhook::{WebhookListener, decode_update, register_webhook, webhook_router},
};
