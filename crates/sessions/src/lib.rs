//! Session dispatch: one handler per chat, one task per update.

pub mod dispatcher;
pub mod handler;

pub use {
    dispatcher::Dispatcher,
    handler::{NoopSessionHandler, SessionFactory, SessionHandler},
};
