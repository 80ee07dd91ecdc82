//! The top-level router: first-match dispatch with not-found, error and
//! panic hooks.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use {
    async_trait::async_trait,
    futures::FutureExt,
    switchboard_sessions::SessionHandler,
    teloxide::types::Update,
    tokio_util::sync::CancellationToken,
    tracing::{debug, trace, warn},
};

#[cfg(feature = "metrics")]
use switchboard_metrics::{counter, routing as routing_metrics};

use crate::{
    error::{Error, Result},
    event::Event,
    filter::{Filter, SharedFilter},
    handler::{Handler, SharedHandler},
    route::{Route, SharedRoute, first_match},
};

/// Receives handler errors. The router discards the error afterwards.
pub type ErrorHandlerFn = Arc<dyn Fn(&Event, &Error) + Send + Sync>;

/// Turns a panic message into an error for the error handler.
pub type RecoverHandlerFn = Arc<dyn Fn(&Event, &str) -> Error + Send + Sync>;

#[derive(Clone, Default)]
pub struct RouterConfig {
    /// Events failing this filter are ignored by the whole router.
    pub global_filter: Option<SharedFilter>,
    pub not_found: Option<SharedHandler>,
    pub error_handler: Option<ErrorHandlerFn>,
    /// Without one, a panicking handler takes the router down with it.
    pub recover_handler: Option<RecoverHandlerFn>,
    pub bot_username: Option<Arc<str>>,
}

impl RouterConfig {
    #[must_use]
    pub fn with_global_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.global_filter = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn with_not_found(mut self, handler: impl Handler + 'static) -> Self {
        self.not_found = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Event, &Error) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn with_recover_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Event, &str) -> Error + Send + Sync + 'static,
    {
        self.recover_handler = Some(Arc::new(handler));
        self
    }

    /// Recover panics as [`Error::PanicRecovered`].
    #[must_use]
    pub fn recover_panics(self) -> Self {
        self.with_recover_handler(|_, message| Error::PanicRecovered {
            message: message.to_string(),
        })
    }

    #[must_use]
    pub fn with_bot_username(mut self, username: impl Into<Arc<str>>) -> Self {
        self.bot_username = Some(username.into());
        self
    }
}

pub struct Router {
    routes: Vec<SharedRoute>,
    config: RouterConfig,
}

impl Router {
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self {
            routes: Vec::new(),
            config,
        }
    }

    /// Add a route. Routes are tried in mount order.
    #[must_use]
    pub fn mount(mut self, route: impl Route + 'static) -> Self {
        self.routes.push(Arc::new(route));
        self
    }

    #[must_use]
    pub fn mount_shared(mut self, route: SharedRoute) -> Self {
        self.routes.push(route);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Wrap a raw update for [`Route::handle`].
    #[must_use]
    pub fn event(&self, update: Arc<Update>, cancel: CancellationToken) -> Event {
        Event::new(update, self.config.bot_username.clone(), cancel)
    }

    async fn route_event(&self, event: &Event) -> Result<()> {
        let Some(route) = first_match(&self.routes, event).await else {
            return self.not_found(event).await;
        };

        match route.handle(event).await {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!(routing_metrics::HANDLED_TOTAL).increment(1);

                Ok(())
            },
            Err(Error::RouteNotFound) => self.not_found(event).await,
            Err(e) => {
                self.report(event, e);
                Ok(())
            },
        }
    }

    async fn not_found(&self, event: &Event) -> Result<()> {
        #[cfg(feature = "metrics")]
        counter!(routing_metrics::NOT_FOUND_TOTAL).increment(1);

        let Some(handler) = &self.config.not_found else {
            return Err(Error::RouteNotFound);
        };
        if let Err(e) = handler.handle(event).await {
            self.report(event, e);
        }
        Ok(())
    }

    fn report(&self, event: &Event, error: Error) {
        #[cfg(feature = "metrics")]
        counter!(routing_metrics::ERRORS_TOTAL).increment(1);

        match &self.config.error_handler {
            Some(handler) => handler(event, &error),
            None => warn!(
                update_id = event.update.id.0,
                chat_id = event.chat().map(|c| c.id.0),
                error = %error,
                "route handler failed"
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl Route for Router {
    /// A nested router takes whatever passes its global filter.
    async fn matches(&self, event: &Event) -> bool {
        self.config
            .global_filter
            .as_ref()
            .is_none_or(|filter| filter.matches(event))
    }

    /// Dispatch to the first matching route.
    ///
    /// Handler errors go to the error handler and are not returned. The only
    /// error returned is [`Error::RouteNotFound`], when nothing matched and
    /// no not-found handler is set.
    async fn handle(&self, event: &Event) -> Result<()> {
        if let Some(filter) = &self.config.global_filter
            && !filter.matches(event)
        {
            trace!(update_id = event.update.id.0, "update rejected by global filter");
            return Ok(());
        }

        match AssertUnwindSafe(self.route_event(event)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let Some(recover) = &self.config.recover_handler else {
                    std::panic::resume_unwind(panic);
                };
                let message = panic_message(panic.as_ref());

                #[cfg(feature = "metrics")]
                counter!(routing_metrics::PANICS_RECOVERED_TOTAL).increment(1);

                let error = recover(event, &message);
                self.report(event, error);
                Ok(())
            },
        }
    }
}

#[async_trait]
impl SessionHandler for Router {
    async fn handle_update(&self, cancel: CancellationToken, update: Arc<Update>) {
        let event = self.event(update, cancel);
        match Route::handle(self, &event).await {
            Ok(()) => {},
            Err(Error::RouteNotFound) => {
                debug!(update_id = event.update.id.0, "no route for update");
            },
            Err(e) => self.report(&event, e),
        }
    }
}
