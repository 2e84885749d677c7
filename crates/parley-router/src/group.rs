//! Route groups.
//!
//! A [`RouterGroup`] scopes middleware. The root group owns the route list;
//! every other group forwards its compiled routes up to the root, so routes
//! keep a single global registration order no matter where they were
//! declared.
//!
//! A route is compiled by the group it is registered on, with that group's
//! middleware only:
//!
//! ```rust,ignore
//! let admin = router.group();
//! admin.use_middleware([require_admin]);
//! admin.register(Filter::command("ban"), ban_user);
//!
//! // Runs `require_admin`, then `audit`, then `refund`.
//! admin.register_with(Filter::command("refund"), refund, [audit]);
//! ```
//!
//! Middleware of ancestor groups is not applied. Adding middleware to a
//! group after a route has been compiled through it does not affect that
//! route.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use parley_core::BoxedStateStore;

use crate::filter::Filter;
use crate::handler::{Handler, into_handler};
use crate::middleware::Middleware;
use crate::route::Route;

enum Node {
    Root {
        routes: Mutex<Vec<Route>>,
        frozen: AtomicBool,
    },
    Child {
        parent: RouterGroup,
    },
}

struct GroupInner {
    node: Node,
    middlewares: Mutex<Vec<Middleware>>,
    compiled: AtomicBool,
    store: BoxedStateStore,
}

/// A node of the route-group tree.
///
/// Cloning is cheap and yields a handle to the same group.
#[derive(Clone)]
pub struct RouterGroup {
    inner: Arc<GroupInner>,
}

impl RouterGroup {
    /// Creates a root group.
    pub(crate) fn root(store: BoxedStateStore) -> Self {
        Self::with_node(
            Node::Root {
                routes: Mutex::new(Vec::new()),
                frozen: AtomicBool::new(false),
            },
            store,
        )
    }

    fn with_node(node: Node, store: BoxedStateStore) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                node,
                middlewares: Mutex::new(Vec::new()),
                compiled: AtomicBool::new(false),
                store,
            }),
        }
    }

    /// Creates a child group with its own, initially empty, middleware list.
    pub fn group(&self) -> RouterGroup {
        Self::with_node(
            Node::Child {
                parent: self.clone(),
            },
            self.inner.store.clone(),
        )
    }

    /// Appends middleware to this group. Registration order is execution order.
    pub fn use_middleware<I>(&self, middlewares: I) -> &Self
    where
        I: IntoIterator<Item = Middleware>,
    {
        let mut own = self.inner.middlewares.lock();
        let before = own.len();
        own.extend(middlewares);
        if self.inner.compiled.load(Ordering::Acquire) && own.len() > before {
            warn!(
                added = own.len() - before,
                "Middleware added after routes were compiled through this group; \
                 existing routes are unaffected"
            );
        }
        self
    }

    /// Registers a route with no route-specific middleware.
    pub fn register<H: Handler>(&self, filter: Filter, handler: H) -> &Self {
        self.register_with(filter, handler, [])
    }

    /// Registers a route.
    ///
    /// `extra` wraps the handler first and so runs closest to it; this
    /// group's middleware wraps the result and runs before it.
    pub fn register_with<H, I>(&self, filter: Filter, handler: H, extra: I) -> &Self
    where
        H: Handler,
        I: IntoIterator<Item = Middleware>,
    {
        let extra: Vec<Middleware> = extra.into_iter().collect();
        let mut service = into_handler(handler);
        for middleware in extra.iter().rev() {
            service = middleware.wrap(service);
        }
        {
            let own = self.inner.middlewares.lock();
            for middleware in own.iter().rev() {
                service = middleware.wrap(service);
            }
            self.inner.compiled.store(true, Ordering::Release);
        }

        let route = Route::new(filter, service);
        debug!(
            route = route.name(),
            kind = ?route.kind(),
            extra = extra.len(),
            "Route compiled"
        );
        self.push_route(route);
        self
    }

    fn push_route(&self, route: Route) {
        match &self.inner.node {
            Node::Child { parent } => parent.push_route(route),
            Node::Root { routes, frozen } => {
                if frozen.load(Ordering::Acquire) {
                    error!(
                        route = route.name(),
                        "Route registered after the router started; ignored"
                    );
                    return;
                }
                routes.lock().push(route);
            }
        }
    }

    /// Stops registration and returns the route table in registration order.
    pub(crate) fn freeze(&self) -> Arc<[Route]> {
        match &self.inner.node {
            Node::Child { parent } => parent.freeze(),
            Node::Root { routes, frozen } => {
                let routes = routes.lock();
                frozen.store(true, Ordering::Release);
                Arc::from(routes.as_slice())
            }
        }
    }

    /// Number of routes registered so far on the whole tree.
    pub fn route_count(&self) -> usize {
        match &self.inner.node {
            Node::Child { parent } => parent.route_count(),
            Node::Root { routes, .. } => routes.lock().len(),
        }
    }

    /// The state store shared by the whole tree.
    pub fn store(&self) -> &BoxedStateStore {
        &self.inner.store
    }

    pub fn is_root(&self) -> bool {
        matches!(self.inner.node, Node::Root { .. })
    }

    /// Number of middleware registered on this group itself.
    pub fn middleware_count(&self) -> usize {
        self.inner.middlewares.lock().len()
    }
}

impl fmt::Debug for RouterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterGroup")
            .field("is_root", &self.is_root())
            .field("middlewares", &self.middleware_count())
            .finish_non_exhaustive()
    }
}
