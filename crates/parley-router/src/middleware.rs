//! Middleware composition.
//!
//! A [`Middleware`] turns one [`BoxedHandler`] into another. Routes are
//! compiled once at registration time by wrapping the terminal handler with
//! the route's own middleware and then with its group's middleware, so the
//! group's layers run first:
//!
//! ```text
//! group.use_middleware([A, B]);
//! group.register_with(filter, handler, [C]);
//!
//!     A ─▶ B ─▶ C ─▶ handler
//! ```
//!
//! Middleware can be written as an async function receiving the context and
//! a [`Next`] continuation, or taken from any tower [`Layer`]:
//!
//! ```rust,ignore
//! let auth = Middleware::from_fn(|ctx: Arc<Ctx>, next: Next| async move {
//!     if ctx.user_id() == BANNED {
//!         return Ok(());
//!     }
//!     next.run(ctx).await
//! });
//!
//! let timeout = Middleware::layer(tower::timeout::TimeoutLayer::new(Duration::from_secs(5)));
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Layer, Service, ServiceExt};

use crate::ctx::Ctx;
use crate::handler::{BoxedHandler, HandlerResult};

type WrapFn = dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync;

/// A reusable wrapper around route handlers.
#[derive(Clone)]
pub struct Middleware {
    name: Arc<str>,
    wrap: Arc<WrapFn>,
}

impl Middleware {
    /// Creates a middleware from a raw wrapping function.
    pub fn new<F>(name: impl Into<Arc<str>>, wrap: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            wrap: Arc::new(wrap),
        }
    }

    /// Creates a middleware from an async function `(ctx, next) -> R`.
    ///
    /// Not calling [`Next::run`] short-circuits the rest of the chain.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Ctx>, Next) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandlerResult,
    {
        Self::new(std::any::type_name::<F>(), move |inner| {
            BoxCloneSyncService::new(FromFn {
                f: f.clone(),
                inner,
            })
        })
    }

    /// Creates a middleware from a tower [`Layer`].
    pub fn layer<L>(layer: L) -> Self
    where
        L: Layer<BoxedHandler> + Send + Sync + 'static,
        L::Service: Service<Arc<Ctx>, Response = (), Error = BoxError> + Clone + Send + Sync + 'static,
        <L::Service as Service<Arc<Ctx>>>::Future: Send + 'static,
    {
        Self::new(std::any::type_name::<L>(), move |inner| {
            BoxCloneSyncService::new(layer.layer(inner))
        })
    }

    /// Renames this middleware (used in log fields).
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wraps `inner`, producing the composed handler.
    pub fn wrap(&self, inner: BoxedHandler) -> BoxedHandler {
        (self.wrap)(inner)
    }
}

impl Layer<BoxedHandler> for Middleware {
    type Service = BoxedHandler;

    fn layer(&self, inner: BoxedHandler) -> Self::Service {
        self.wrap(inner)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The remainder of a handler chain, as seen from a middleware.
pub struct Next {
    inner: BoxedHandler,
}

impl Next {
    /// Runs the wrapped handler (and any inner middleware).
    pub async fn run(self, ctx: Arc<Ctx>) -> Result<(), BoxError> {
        self.inner.oneshot(ctx).await
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct FromFn<F> {
    f: F,
    inner: BoxedHandler,
}

impl<F, Fut> Service<Arc<Ctx>> for FromFn<F>
where
    F: Fn(Arc<Ctx>, Next) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerResult,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<Ctx>) -> Self::Future {
        let next = Next {
            inner: self.inner.clone(),
        };
        let fut = (self.f)(ctx, next);
        Box::pin(async move { fut.await.into_result() })
    }
}
