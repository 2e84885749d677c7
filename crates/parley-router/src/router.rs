//! The top-level event router.
//!
//! The [`Router`] owns the event source, the worker tasks, the context pool
//! and the root [`RouterGroup`]. Its lifecycle has three phases:
//!
//! 1. **Registration**: routes and middleware are added through the root
//!    group or child groups.
//! 2. **Listening**: [`listen`](Router::listen) freezes the route table,
//!    starts the intake pump and the workers, and blocks until its token is
//!    cancelled.
//! 3. **Shutdown**: [`shutdown`](Router::shutdown) stops intake and waits,
//!    with a growing backoff bounded by a hard deadline, for in-flight
//!    events to finish. Running handlers are never aborted.
//!
//! ```rust,ignore
//! let router = Router::new(source, sender, store);
//! router.register(Filter::command("start"), start);
//! router.register(Filter::state("awaiting_name"), save_name);
//!
//! let token = CancellationToken::new();
//! let listening = tokio::spawn({
//!     let router = router.clone();
//!     let token = token.clone();
//!     async move { router.listen(token).await }
//! });
//!
//! // ... later
//! router.shutdown(&token).await?;
//! ```
//!
//! # Dispatch
//!
//! For each event the routes are tried in registration order and the first
//! match runs; nothing else does. Before the first conversation route is
//! evaluated, the conversation state is loaded once. A missing row counts as
//! the empty state; any other store error drops the event.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use parley_core::{BoxedSender, BoxedStateStore, Event, EventSource};

use crate::config::{DispatchMode, RouterConfig};
use crate::ctx::Ctx;
use crate::drain::DrainBackoff;
use crate::error::{DispatchResult, ShutdownError};
use crate::filter::Filter;
use crate::group::RouterGroup;
use crate::handler::Handler;
use crate::pool::Pool;
use crate::route::{Route, RouteKind};
use crate::worker;

struct RouterInner {
    config: RouterConfig,
    root: RouterGroup,
    routes: OnceLock<Arc<[Route]>>,
    pool: Pool<Ctx>,
    source: Mutex<Option<Box<dyn EventSource>>>,
    tracker: TaskTracker,
    /// Parent of every per-event token; cancelled when a drain times out.
    exec: CancellationToken,
}

/// The stateful inbound-event router.
///
/// Cloning is cheap; clones share the same routes, pool and workers.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Creates a router with the default configuration.
    pub fn new<S>(source: S, sender: BoxedSender, store: BoxedStateStore) -> Self
    where
        S: EventSource,
    {
        Self::builder(source, sender, store).build()
    }

    pub fn builder<S>(source: S, sender: BoxedSender, store: BoxedStateStore) -> RouterBuilder
    where
        S: EventSource,
    {
        RouterBuilder {
            source: Box::new(source),
            sender,
            store,
            config: RouterConfig::default(),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    // ─── Registration ─────────────────────────────────────────────────────────

    /// The root group. Middleware added here applies to routes registered
    /// directly on the root.
    pub fn root(&self) -> &RouterGroup {
        &self.inner.root
    }

    /// Creates a child group of the root.
    pub fn group(&self) -> RouterGroup {
        self.inner.root.group()
    }

    /// Registers a route on the root group.
    pub fn register<H: Handler>(&self, filter: Filter, handler: H) -> &Self {
        self.inner.root.register(filter, handler);
        self
    }

    /// Number of registered routes.
    pub fn route_count(&self) -> usize {
        match self.inner.routes.get() {
            Some(routes) => routes.len(),
            None => self.inner.root.route_count(),
        }
    }

    /// The route table, frozen on first use.
    fn routes(&self) -> &Arc<[Route]> {
        self.inner.routes.get_or_init(|| self.inner.root.freeze())
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────────

    /// Starts the intake pump and the workers, then waits for `token`.
    ///
    /// Failures while handling an event are logged and never stop a worker.
    /// Workers exit when `token` is cancelled or the event source closes.
    /// Only the first call consumes the source; later calls return at once.
    pub async fn listen(&self, token: CancellationToken) {
        let Some(source) = self.inner.source.lock().take() else {
            warn!("Router is already listening; the event source was consumed");
            return;
        };

        let routes = self.routes().len();
        let workers = self.inner.config.effective_workers();
        let capacity = self.inner.config.effective_queue_capacity();
        let mode = self.inner.config.dispatch;
        let tracker = &self.inner.tracker;

        match mode {
            DispatchMode::Shared => {
                let (tx, rx) = mpsc::channel(capacity);
                let rx = Arc::new(tokio::sync::Mutex::new(rx));
                for id in 0..workers {
                    tracker.spawn(worker::shared_worker(
                        id,
                        self.clone(),
                        rx.clone(),
                        token.clone(),
                    ));
                }
                tracker.spawn(worker::pump(source, vec![tx], token.clone()));
            }
            DispatchMode::Sharded => {
                let per_shard = (capacity / workers).max(1);
                let mut queues = Vec::with_capacity(workers);
                for id in 0..workers {
                    let (tx, rx) = mpsc::channel(per_shard);
                    queues.push(tx);
                    tracker.spawn(worker::shard_worker(id, self.clone(), rx, token.clone()));
                }
                tracker.spawn(worker::pump(source, queues, token.clone()));
            }
        }

        info!(workers, routes, mode = ?mode, "Router listening");
        token.cancelled().await;
        info!("Router stopped listening");
    }

    /// Serves one event: borrows a context, dispatches, and returns the
    /// context to the pool.
    ///
    /// Errors and panics are logged; the event is then dropped.
    pub async fn serve_event(&self, event: Event) {
        let span = debug_span!(
            "dispatch",
            event_id = event.id,
            user_id = event.user_id,
            chat_id = event.chat_id,
            kind = event.kind_name(),
        );
        self.serve(event).instrument(span).await
    }

    async fn serve(&self, event: Event) {
        let mut slot = self.inner.pool.acquire();
        let Some(ctx) = slot.get_mut() else {
            error!("Pooled context is unexpectedly shared; dropping event");
            return;
        };
        ctx.install(event, self.inner.exec.child_token());
        let Some(ctx) = slot.share() else {
            return;
        };

        let outcome = AssertUnwindSafe(self.dispatch(&ctx)).catch_unwind().await;
        drop(ctx);

        match outcome {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => debug!("No route matched"),
            Ok(Err(err)) => error!(error = %err, "Dispatch aborted, event dropped"),
            Err(panic) => error!(
                panic = panic_message(panic.as_ref()),
                "Handler panicked, event dropped"
            ),
        }
    }

    /// Runs the first matching route for `ctx`.
    ///
    /// Returns whether a route matched. A handler error is logged and still
    /// counts as a match.
    pub async fn dispatch(&self, ctx: &Arc<Ctx>) -> DispatchResult<bool> {
        let routes = self.routes();
        for route in routes.iter() {
            if route.kind() == RouteKind::Conversation {
                ctx.ensure_state_loaded().await?;
            }
            if !route.matches(ctx) {
                continue;
            }

            debug!(route = route.name(), "Route matched");
            ctx.set_chain(vec![route.handler().clone()]);
            if let Err(err) = ctx.next().await {
                warn!(route = route.name(), error = %err, "Handler returned an error");
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Stops intake and waits for in-flight events to finish.
    ///
    /// `cancel` should be the token given to [`listen`](Self::listen). The
    /// wait repeats with growing intervals until every worker has exited or
    /// the drain deadline passes. On timeout the per-event tokens of the
    /// remaining work are cancelled and [`ShutdownError::DrainTimeout`] is
    /// returned; that work is not aborted.
    pub async fn shutdown(&self, cancel: &CancellationToken) -> Result<(), ShutdownError> {
        let tracker = &self.inner.tracker;
        let drain = &self.inner.config.drain;
        tracker.close();
        cancel.cancel();

        let deadline = drain.deadline();
        let started = Instant::now();
        let mut backoff = DrainBackoff::from_config(drain);
        info!(in_flight = tracker.len(), deadline = ?deadline, "Draining router");

        loop {
            let remaining = deadline.saturating_sub(started.elapsed());
            let step = backoff.next().unwrap_or(remaining).min(remaining);
            if tokio::time::timeout(step, tracker.wait()).await.is_ok() {
                info!(elapsed = ?started.elapsed(), "Router drained");
                return Ok(());
            }
            if started.elapsed() >= deadline {
                break;
            }
            debug!(in_flight = tracker.len(), waited = ?step, "Still draining");
        }

        // Counted before cancelling, since cancelled handlers finish quickly.
        let in_flight = tracker.len();
        self.inner.exec.cancel();
        warn!(in_flight, deadline = ?deadline, "Drain deadline elapsed");
        Err(ShutdownError::DrainTimeout {
            deadline,
            in_flight,
        })
    }

    /// Workers, pumps and handlers still running.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Number of contexts currently idle in the pool.
    pub fn idle_contexts(&self) -> usize {
        self.inner.pool.idle()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.inner.config)
            .field("routes", &self.route_count())
            .field("pool", &self.inner.pool)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

/// Builder for [`Router`].
pub struct RouterBuilder {
    source: Box<dyn EventSource>,
    sender: BoxedSender,
    store: BoxedStateStore,
    config: RouterConfig,
}

impl RouterBuilder {
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the number of workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.config.dispatch = mode;
        self
    }

    pub fn build(self) -> Router {
        let Self {
            source,
            sender,
            store,
            config,
        } = self;

        let root = RouterGroup::root(store.clone());
        let pool = Pool::new(move || Ctx::new(sender.clone(), store.clone()));
        Router {
            inner: Arc::new(RouterInner {
                config,
                root,
                routes: OnceLock::new(),
                pool,
                source: Mutex::new(Some(source)),
                tracker: TaskTracker::new(),
                exec: CancellationToken::new(),
            }),
        }
    }
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
