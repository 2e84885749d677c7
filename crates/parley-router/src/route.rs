//! Compiled routes.

use std::fmt;
use std::sync::Arc;

use crate::ctx::Ctx;
use crate::filter::Filter;
use crate::handler::BoxedHandler;

/// Whether a route depends on persisted conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// Always active; matched on the event alone.
    Plain,
    /// Matched on the conversation's state label, which the router loads
    /// before evaluating the filter.
    Conversation,
}

/// An immutable binding of a filter to a fully composed handler.
#[derive(Clone)]
pub struct Route {
    name: Arc<str>,
    filter: Filter,
    handler: BoxedHandler,
    kind: RouteKind,
}

impl Route {
    pub(crate) fn new(filter: Filter, handler: BoxedHandler) -> Self {
        Self {
            name: Arc::from(filter.describe()),
            kind: filter.kind(),
            filter,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub(crate) fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    pub fn matches(&self, ctx: &Ctx) -> bool {
        self.filter.matches(ctx)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
