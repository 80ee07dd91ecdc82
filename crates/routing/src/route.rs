//! Routes pair a filter with a handler; groups nest routes behind a shared
//! filter and middleware.

use std::sync::Arc;

use {async_trait::async_trait, regex::Regex, teloxide::types::UpdateKind};

use crate::{
    error::{Error, Result},
    event::Event,
    filter::{Filter, SharedFilter, filter_fn, narrow},
    filters,
    handler::{Handler, Middleware, SharedHandler, wrap_all},
};

/// Something the router can try: a match test and a way to handle.
///
/// `matches` may consult external state, so it is async; callers evaluate it
/// once per event and do not re-check before `handle`.
#[async_trait]
pub trait Route: Send + Sync {
    async fn matches(&self, event: &Event) -> bool;

    async fn handle(&self, event: &Event) -> Result<()>;
}

pub type SharedRoute = Arc<dyn Route>;

/// Lets a route sit where a handler is expected, e.g. inside middleware.
struct RouteHandler(SharedRoute);

#[async_trait]
impl Handler for RouteHandler {
    async fn handle(&self, event: &Event) -> Result<()> {
        self.0.handle(event).await
    }
}

/// First route in `routes` that matches `event`.
pub(crate) async fn first_match<'a>(routes: &'a [SharedRoute], event: &Event) -> Option<&'a SharedRoute> {
    for route in routes {
        if route.matches(event).await {
            return Some(route);
        }
    }
    None
}

// ── BasicRoute ──────────────────────────────────────────────────────────────

pub struct BasicRoute {
    filter: SharedFilter,
    handler: SharedHandler,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl BasicRoute {
    pub fn new(filter: impl Filter + 'static, handler: impl Handler + 'static) -> Self {
        Self::from_shared(Arc::new(filter), Arc::new(handler))
    }

    #[must_use]
    pub fn from_shared(filter: SharedFilter, handler: SharedHandler) -> Self {
        Self {
            filter,
            handler,
            middleware: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) {
        self.middleware.push(Arc::new(middleware));
    }

    #[must_use]
    pub fn shared(self) -> SharedRoute {
        Arc::new(self)
    }
}

#[async_trait]
impl Route for BasicRoute {
    async fn matches(&self, event: &Event) -> bool {
        self.filter.matches(event)
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        wrap_all(Arc::clone(&self.handler), &self.middleware)
            .handle(event)
            .await
    }
}

// ── RouteGroup ──────────────────────────────────────────────────────────────

/// Child routes behind a group-level filter. Only the group filter decides
/// whether the group matches; children are tried when it handles.
pub struct RouteGroup {
    filter: SharedFilter,
    routes: Vec<SharedRoute>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl RouteGroup {
    pub fn new(filter: impl Filter + 'static) -> Self {
        Self {
            filter: Arc::new(filter),
            routes: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// A group that matches every event.
    #[must_use]
    pub fn any() -> Self {
        Self::new(filters::any())
    }

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
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) {
        self.middleware.push(Arc::new(middleware));
    }

    /// Whether any child would take `event`, regardless of the group filter.
    pub async fn has_matching_route(&self, event: &Event) -> bool {
        first_match(&self.routes, event).await.is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl Route for RouteGroup {
    async fn matches(&self, event: &Event) -> bool {
        self.filter.matches(event)
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let Some(route) = first_match(&self.routes, event).await else {
            return Err(Error::RouteNotFound);
        };
        let target: SharedHandler = Arc::new(RouteHandler(Arc::clone(route)));
        wrap_all(target, &self.middleware).handle(event).await
    }
}

// ── Constructors ────────────────────────────────────────────────────────────
//
// Each takes an optional extra filter that must also match.

pub fn any_route(handler: impl Handler + 'static) -> BasicRoute {
    BasicRoute::new(filters::any(), handler)
}

pub fn message_route(extra: Option<SharedFilter>, handler: impl Handler + 'static) -> BasicRoute {
    BasicRoute::from_shared(narrow(filters::is_message(), extra), Arc::new(handler))
}

/// Messages carrying one of `commands`, a space-separated list such as
/// `"start help"`. Leading slashes are optional.
pub fn command_route(
    commands: &str,
    extra: Option<SharedFilter>,
    handler: impl Handler + 'static,
) -> BasicRoute {
    let names: Vec<SharedFilter> = commands
        .split_whitespace()
        .map(|name| Arc::new(filters::command(name)) as SharedFilter)
        .collect();
    BasicRoute::from_shared(narrow(crate::filter::or(names), extra), Arc::new(handler))
}

/// Messages whose text matches `pattern`.
pub fn text_regex_route(
    pattern: &str,
    extra: Option<SharedFilter>,
    handler: impl Handler + 'static,
) -> Result<BasicRoute> {
    let pattern = Regex::new(pattern)?;
    let filter = crate::filter::and([
        Arc::new(filters::is_message()) as SharedFilter,
        Arc::new(filters::text_regex(pattern)),
    ]);
    Ok(BasicRoute::from_shared(narrow(filter, extra), Arc::new(handler)))
}

/// Callback queries whose data matches `pattern`.
pub fn callback_query_route(
    pattern: &str,
    extra: Option<SharedFilter>,
    handler: impl Handler + 'static,
) -> Result<BasicRoute> {
    let pattern = Regex::new(pattern)?;
    let filter = filter_fn(move |event| match &event.update.kind {
        UpdateKind::CallbackQuery(query) => query
            .data
            .as_deref()
            .is_some_and(|data| pattern.is_match(data)),
        _ => false,
    });
    Ok(BasicRoute::from_shared(narrow(filter, extra), Arc::new(handler)))
}

/// Inline queries whose query text matches `pattern`.
pub fn inline_query_route(
    pattern: &str,
    extra: Option<SharedFilter>,
    handler: impl Handler + 'static,
) -> Result<BasicRoute> {
    let pattern = Regex::new(pattern)?;
    let filter = filter_fn(move |event| match &event.update.kind {
        UpdateKind::InlineQuery(query) => pattern.is_match(&query.query),
        _ => false,
    });
    Ok(BasicRoute::from_shared(narrow(filter, extra), Arc::new(handler)))
}

pub fn edited_message_route(
    extra: Option<SharedFilter>,
    handler: impl Handler + 'static,
) -> BasicRoute {
    BasicRoute::from_shared(narrow(filters::is_edited_message(), extra), Arc::new(handler))
}

pub fn channel_post_route(
    extra: Option<SharedFilter>,
    handler: impl Handler + 'static,
) -> BasicRoute {
    BasicRoute::from_shared(narrow(filters::is_channel_post(), extra), Arc::new(handler))
}

pub fn edited_channel_post_route(
    extra: Option<SharedFilter>,
    handler: impl Handler + 'static,
) -> BasicRoute {
    BasicRoute::from_shared(
        narrow(filters::is_edited_channel_post(), extra),
        Arc::new(handler),
    )
}
