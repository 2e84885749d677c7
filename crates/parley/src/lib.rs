//! # Parley
//!
//! A stateful event router for chat bots.
//!
//! ## Overview
//!
//! Parley sits between a platform's update feed and your handlers. Each
//! inbound event is matched against an ordered route table; the first match
//! runs through its group's middleware and then the handler. Routes can
//! depend on a per-conversation state label, which is loaded lazily from a
//! pluggable store the first time a conversation route is consulted.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────┐     ┌──────────────┐     ┌──────────────────────────┐
//! │ EventSource │────▶│  queue   │────▶│ worker 0..N  │────▶│ first matching route     │──▶ Sender
//! └─────────────┘     └──────────┘     │ (pooled Ctx) │     │ group middleware ▶ handler│
//!                                      └──────────────┘     └──────────────────────────┘
//!                                             │ lazy load              │ update / clear
//!                                             └────────▶ StateStore ◀──┘
//! ```
//!
//! - **Core**: events, the callback codec and collaborator traits (`parley-core`)
//! - **Router**: filters, routes, groups, middleware, workers and drain (`parley-router`)
//! - **Runtime**: configuration, logging and signal handling (`parley-runtime`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ParleyRuntime::new();
//!     let router = runtime.router(source, sender, Arc::new(MemoryStateStore::new()));
//!
//!     router.register(Filter::command("start"), |ctx: Arc<Ctx>| async move {
//!         ctx.update_state("awaiting_name", HashMap::new()).await?;
//!         ctx.reply("What's your name?").await.map(|_| ())
//!     });
//!
//!     runtime.run(&router).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: read `parley.toml` (default)
//! - `yaml-config`: read `parley.yaml`
//! - `json-log`: enable `logging.format = "json"`

pub use parley_core as core;
pub use parley_router as router;
pub use parley_runtime as runtime;

/// Commonly used types for building a bot.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use parley_runtime::{ParleyConfig, ParleyRuntime};

    // Routing
    pub use parley_router::{
        BoxError, Ctx, DispatchMode, Filter, Middleware, Next, Router, RouterConfig, RouterGroup,
    };

    // Collaborators and payloads
    pub use parley_core::{
        BoxedSender, BoxedStateStore, Button, CallbackData, ConversationKey, ConversationState,
        Event, EventKind, EventSource, MemoryStateStore, Reply, Sender, StateStore,
    };
}
