//! Outbound admission control and the rate-limited Telegram client.
//!
//! Every outbound request waits on two token buckets: one shared by the whole
//! process and one per recipient. [`AdmissionControl`] owns both;
//! [`TelegramTransport`] gates each Bot API call through it.

pub mod admission;
pub mod bucket;
pub mod client;
pub mod config;
pub mod error;

pub use {
    admission::{AdmissionControl, RecipientRegistry},
    bucket::{Cancelled, TokenBucket},
    client::TelegramTransport,
    config::{BucketConfig, RateLimitConfig},
    error::{Error, Result},
};
