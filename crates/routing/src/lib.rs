//! Update routing: filters, handlers, routes, groups, conversations and the
//! top-level [`Router`].
//!
//! A [`Router`] tries its routes in mount order and hands the event to the
//! first one that matches. It implements
//! [`SessionHandler`](switchboard_sessions::SessionHandler), so one router can
//! serve every session the dispatcher creates.

pub mod conversation;
pub mod error;
pub mod event;
pub mod filter;
pub mod filters;
pub mod handler;
pub mod route;
pub mod router;

pub use {
    conversation::{ConversationContext, ConversationRoute, StateTable},
    error::{Error, Result},
    event::Event,
    filter::{AndFilter, Filter, FilterExt, NotFilter, OrFilter, SharedFilter, filter_fn},
    handler::{Handler, Middleware, SharedHandler, handler_fn},
    route::{
        BasicRoute, Route, RouteGroup, SharedRoute, any_route, callback_query_route,
        channel_post_route, command_route, edited_channel_post_route, edited_message_route,
        inline_query_route, message_route, text_regex_route,
    },
    router::{ErrorHandlerFn, RecoverHandlerFn, Router, RouterConfig},
};
