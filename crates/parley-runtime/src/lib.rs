//! Everything around a [`Router`](parley_router::Router) that belongs to the
//! process rather than the bot: where settings are read from ([`config`]),
//! how tracing output is written ([`logging`]), and when to stop serving and
//! start draining ([`ParleyRuntime`]).
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = parley_runtime::ParleyRuntime::new();
//!     let router = runtime.router(source, sender, store);
//!     router.register(Filter::command("start"), start);
//!     runtime.run(&router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, ParleyConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{ParleyRuntime, RuntimeBuilder};

/// So handlers can log without a direct `tracing` dependency.
pub use tracing;
pub use tracing_subscriber;

pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
