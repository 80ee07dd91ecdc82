//! Predicates over events and the combinators that compose them.

use std::sync::Arc;

use crate::event::Event;

/// A pure predicate over an event.
pub trait Filter: Send + Sync {
    fn matches(&self, event: &Event) -> bool;
}

pub type SharedFilter = Arc<dyn Filter>;

impl<F: Filter + ?Sized> Filter for Arc<F> {
    fn matches(&self, event: &Event) -> bool {
        (**self).matches(event)
    }
}

impl<F: Filter + ?Sized> Filter for Box<F> {
    fn matches(&self, event: &Event) -> bool {
        (**self).matches(event)
    }
}

/// Adapts a closure into a [`Filter`].
pub struct FnFilter<F>(F);

impl<F> Filter for FnFilter<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn matches(&self, event: &Event) -> bool {
        (self.0)(event)
    }
}

pub fn filter_fn<F>(f: F) -> FnFilter<F>
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    FnFilter(f)
}

/// Matches when every filter matches. Stops at the first that does not.
/// Empty matches everything.
pub struct AndFilter(pub Vec<SharedFilter>);

impl Filter for AndFilter {
    fn matches(&self, event: &Event) -> bool {
        self.0.iter().all(|filter| filter.matches(event))
    }
}

/// Matches when any filter matches. Stops at the first that does.
/// Empty matches nothing.
pub struct OrFilter(pub Vec<SharedFilter>);

impl Filter for OrFilter {
    fn matches(&self, event: &Event) -> bool {
        self.0.iter().any(|filter| filter.matches(event))
    }
}

pub struct NotFilter(pub SharedFilter);

impl Filter for NotFilter {
    fn matches(&self, event: &Event) -> bool {
        !self.0.matches(event)
    }
}

pub fn and(filters: impl IntoIterator<Item = SharedFilter>) -> AndFilter {
    AndFilter(filters.into_iter().collect())
}

pub fn or(filters: impl IntoIterator<Item = SharedFilter>) -> OrFilter {
    OrFilter(filters.into_iter().collect())
}

pub fn not(filter: impl Filter + 'static) -> NotFilter {
    NotFilter(Arc::new(filter))
}

/// Chaining sugar over the combinators.
pub trait FilterExt: Filter + Sized + 'static {
    fn and<F: Filter + 'static>(self, other: F) -> AndFilter {
        AndFilter(vec![Arc::new(self), Arc::new(other)])
    }

    fn or<F: Filter + 'static>(self, other: F) -> OrFilter {
        OrFilter(vec![Arc::new(self), Arc::new(other)])
    }

    fn not(self) -> NotFilter {
        NotFilter(Arc::new(self))
    }

    fn shared(self) -> SharedFilter {
        Arc::new(self)
    }
}

impl<F: Filter + Sized + 'static> FilterExt for F {}

/// `base`, narrowed by `extra` when given.
pub(crate) fn narrow(base: impl Filter + 'static, extra: Option<SharedFilter>) -> SharedFilter {
    match extra {
        Some(extra) => Arc::new(AndFilter(vec![Arc::new(base), extra])),
        None => Arc::new(base),
    }
}
