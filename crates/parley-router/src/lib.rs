//! # Parley Router
//!
//! A stateful inbound-event router for chat bots.
//!
//! Events flow from an [`EventSource`](parley_core::EventSource) through a
//! bounded queue to a fixed pool of workers. Each worker borrows a pooled
//! [`Ctx`], tries the registered [`Route`]s in order and runs the first one
//! whose [`Filter`] matches:
//!
//! ```text
//! EventSource ─▶ pump ─▶ queue ─▶ worker × N ─▶ Router::dispatch
//!                                                   │
//!                     ┌─────────────────────────────┘
//!                     ▼
//!        routes[0] ─▶ routes[1] ─▶ ... first match runs:
//!                                  group middleware ─▶ route middleware ─▶ handler
//! ```
//!
//! Routes built from [`Filter::state`] are conversation routes: before the
//! first of them is evaluated the router loads the conversation's state
//! label from the [`StateStore`](parley_core::StateStore), once per event.
//!
//! ```rust,ignore
//! use parley_router::{Filter, Router, Ctx};
//!
//! async fn start(ctx: Arc<Ctx>) -> Result<(), BoxError> {
//!     ctx.reply("What's your name?").await?;
//!     ctx.update_state("awaiting_name", HashMap::new()).await?;
//!     Ok(())
//! }
//!
//! async fn save_name(ctx: Arc<Ctx>) -> Result<(), BoxError> {
//!     let name = ctx.text().unwrap_or_default().to_string();
//!     ctx.update_state("", HashMap::from([("name".into(), name)])).await?;
//!     ctx.reply("Thanks!").await?;
//!     Ok(())
//! }
//!
//! let router = Router::new(source, sender, store);
//! router.register(Filter::command("start"), start);
//! router.register(Filter::state("awaiting_name"), save_name);
//! router.listen(token).await;
//! ```

pub mod config;
pub mod ctx;
pub mod drain;
pub mod error;
pub mod filter;
pub mod group;
pub mod handler;
pub mod middleware;
pub mod pool;
pub mod route;
pub mod router;
mod worker;

pub use config::{DispatchMode, DrainConfig, RouterConfig};
pub use ctx::Ctx;
pub use drain::DrainBackoff;
pub use error::{DispatchError, DispatchResult, ShutdownError};
pub use filter::{Filter, Predicate};
pub use group::RouterGroup;
pub use handler::{BoxedHandler, Handler, HandlerResult, HandlerService, into_handler};
pub use middleware::{Middleware, Next};
pub use pool::{Pool, Pooled, Reset};
pub use route::{Route, RouteKind};
pub use router::{Router, RouterBuilder};

pub use tower::BoxError;
