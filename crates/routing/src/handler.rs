use std::{future::Future, sync::Arc};

use async_trait::async_trait;

use crate::{error::Result, event::Event};

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<()>;
}

pub type SharedHandler = Arc<dyn Handler>;

/// Adapts an async closure taking the event by value into a [`Handler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> Result<()> {
        (self.0)(event.clone()).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnHandler(f)
}

/// Wraps a handler in another. The last middleware registered on a route or
/// group is the outermost.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: SharedHandler) -> SharedHandler;
}

impl<F> Middleware for F
where
    F: Fn(SharedHandler) -> SharedHandler + Send + Sync,
{
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        self(next)
    }
}

/// Apply `middleware` in registration order, so the last one ends up
/// outermost.
pub(crate) fn wrap_all(handler: SharedHandler, middleware: &[Arc<dyn Middleware>]) -> SharedHandler {
    middleware
        .iter()
        .fold(handler, |inner, layer| layer.wrap(inner))
}
