//! Handler system for the router.
//!
//! A handler is any async function taking the shared event context:
//!
//! ```rust,ignore
//! async fn start(ctx: Arc<Ctx>) -> Result<(), SendError> {
//!     ctx.reply("Welcome!").await?;
//!     Ok(())
//! }
//!
//! async fn log_only(ctx: Arc<Ctx>) {
//!     tracing::info!(text = ?ctx.text(), "message seen");
//! }
//! ```
//!
//! Handlers may return `()` or `Result<(), E>` for any `E: Into<BoxError>`.
//! Each handler is adapted into a tower [`Service`] by [`HandlerService`] and
//! type-erased into a [`BoxedHandler`]; middleware is expressed as wrappers
//! around that service (see [`Middleware`](crate::Middleware)).

use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service};

use crate::ctx::Ctx;

/// A type-erased, `Clone + Send + Sync` handler service.
///
/// This is what a route stores after all middleware has been applied.
pub type BoxedHandler = BoxCloneSyncService<Arc<Ctx>, (), BoxError>;

// ============================================================================
// HandlerResult
// ============================================================================

/// Return types accepted from handlers and middleware.
pub trait HandlerResult: Send + 'static {
    /// Normalizes the value into the router's error type.
    fn into_result(self) -> Result<(), BoxError>;
}

impl HandlerResult for () {
    fn into_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> HandlerResult for Result<(), E>
where
    E: Into<BoxError> + Send + 'static,
{
    fn into_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The terminal step of a route.
///
/// Implemented for every `Fn(Arc<Ctx>) -> impl Future` whose output is a
/// [`HandlerResult`].
pub trait Handler: Clone + Send + Sync + 'static {
    /// Invokes the handler.
    fn call(&self, ctx: Arc<Ctx>) -> BoxFuture<'static, Result<(), BoxError>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<Ctx>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerResult,
{
    fn call(&self, ctx: Arc<Ctx>) -> BoxFuture<'static, Result<(), BoxError>> {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_result() })
    }
}

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] that calls a single handler.
#[derive(Clone)]
pub struct HandlerService<H> {
    handler: H,
}

impl<H: Handler> HandlerService<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }
}

impl<H: Handler> Service<Arc<Ctx>> for HandlerService<H> {
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<Ctx>) -> Self::Future {
        self.handler.call(ctx)
    }
}

/// Converts a handler into a [`BoxedHandler`].
pub fn into_handler<H: Handler>(handler: H) -> BoxedHandler {
    BoxCloneSyncService::new(HandlerService::new(handler))
}
