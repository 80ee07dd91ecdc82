//! A Telegram bot assembled from the switchboard crates.
//!
//! ```rust,ignore
//! let config = switchboard_config::apply_env_overrides(switchboard_config::discover_and_load()?)?;
//! switchboard_bot::init_telemetry(&config.log);
//!
//! let cancel = CancellationToken::new();
//! let server = BotServer::new(&config, cancel.clone())?;
//! let chat = server.chat_client();
//! server
//!     .mount(command_route("ping", None, handler_fn(move |event| pong(chat.clone(), event))))
//!     .run()
//!     .await?;
//! ```

pub mod error;
pub mod server;
pub mod settings;
pub mod telemetry;

pub use {
    error::{Error, Result},
    server::{AllowlistFactory, BotServer, log_error, log_not_found},
    settings::{open_conversation_store, polling_config, rate_limit_config},
    telemetry::{env_filter, init_telemetry},
};

#[cfg(feature = "metrics")]
pub use switchboard_metrics::{MetricsHandle, MetricsRecorderConfig, init_metrics};
