use std::sync::Arc;

use {
    async_trait::async_trait, switchboard_common::SessionKey, teloxide::types::Update,
    tokio_util::sync::CancellationToken, tracing::trace,
};

/// Per-session update handler.
///
/// One instance serves every update for its session key, and calls for the
/// same key may overlap: the dispatcher does not serialize them.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    async fn handle_update(&self, cancel: CancellationToken, update: Arc<Update>);
}

/// Builds the handler for a session the first time its key is seen.
pub trait SessionFactory: Send + Sync {
    fn create(&self, key: SessionKey) -> Arc<dyn SessionHandler>;
}

impl<F> SessionFactory for F
where
    F: Fn(SessionKey) -> Arc<dyn SessionHandler> + Send + Sync,
{
    fn create(&self, key: SessionKey) -> Arc<dyn SessionHandler> {
        self(key)
    }
}

/// Accepts and ignores every update.
pub struct NoopSessionHandler;

#[async_trait]
impl SessionHandler for NoopSessionHandler {
    async fn handle_update(&self, _cancel: CancellationToken, update: Arc<Update>) {
        trace!(update_id = update.id.0, "update ignored");
    }
}
