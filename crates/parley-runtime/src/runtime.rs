//! Serving a [`Router`] for the lifetime of the process.
//!
//! ```rust,ignore
//! // parley.toml from the current directory, or defaults
//! let runtime = ParleyRuntime::new();
//!
//! let router = runtime.router(source, sender, store);
//! router.register(Filter::command("start"), start);
//!
//! // Ctrl+C or SIGTERM stops intake, then in-flight handlers drain
//! runtime.run(&router).await?;
//! ```

use std::future::Future;
use std::path::Path;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{ConfigLoader, ConfigResult, ParleyConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use parley_core::{BoxedSender, BoxedStateStore, EventSource};
use parley_router::Router;

/// Holds the process configuration and drives routers built from it.
#[derive(Debug, Clone)]
pub struct ParleyRuntime {
    config: ParleyConfig,
}

impl ParleyRuntime {
    /// Searches the current directory for a config file. A broken file is
    /// reported on stderr and the defaults are used instead, since logging
    /// is not installed yet.
    pub fn new() -> Self {
        let config = match ConfigLoader::new().with_current_dir().load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("parley: {e}; continuing with default configuration");
                ParleyConfig::default()
            }
        };
        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Installs the global subscriber from `config.logging`, unless the
    /// process already has one.
    pub fn from_config(config: &ParleyConfig) -> Self {
        logging::init_from_config(&config.logging);
        info!(
            workers = config.router.workers,
            queue_capacity = config.router.queue_capacity,
            dispatch = ?config.router.dispatch,
            "Parley runtime ready"
        );
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    /// A router with this runtime's `[router]` table applied.
    pub fn router<S>(&self, source: S, sender: BoxedSender, store: BoxedStateStore) -> Router
    where
        S: EventSource,
    {
        Router::builder(source, sender, store)
            .config(self.config.router.clone())
            .build()
    }

    /// [`run_until`](Self::run_until) Ctrl+C or SIGTERM.
    pub async fn run(&self, router: &Router) -> RuntimeResult<()> {
        let stop = shutdown_signal()?;
        info!("Serving until Ctrl+C or SIGTERM");
        self.run_until(router, stop).await
    }

    /// Serves `router` until `stop` resolves, then drains it.
    ///
    /// A router whose source was already taken by another `listen` yields
    /// [`RuntimeError::AlreadyListening`] without waiting on `stop`.
    pub async fn run_until<F>(&self, router: &Router, stop: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let token = CancellationToken::new();
        let listen = router.listen(token.clone());
        tokio::pin!(listen);

        // `listen` goes first so the source is claimed even when `stop` is
        // already resolved.
        tokio::select! {
            biased;
            _ = &mut listen => {
                error!("Event source already claimed by another listener");
                return Err(RuntimeError::AlreadyListening);
            }
            _ = stop => info!("Stop requested, draining"),
        }

        router.shutdown(&token).await?;
        info!("Router drained");
        Ok(())
    }
}

impl Default for ParleyRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on the first Ctrl+C or SIGTERM. Handlers are installed before
/// returning so a registration failure is reported before serving starts.
fn shutdown_signal() -> RuntimeResult<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(RuntimeError::Signal)?;

    Ok(async move {
        let interrupt = async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Ctrl+C listener failed");
            }
        };

        #[cfg(unix)]
        {
            tokio::select! {
                _ = interrupt => info!(signal = "SIGINT", "Signal received"),
                _ = terminate.recv() => info!(signal = "SIGTERM", "Signal received"),
            }
        }

        #[cfg(not(unix))]
        {
            interrupt.await;
            info!(signal = "ctrl-c", "Signal received");
        }
    })
}

/// Configures where a [`ParleyRuntime`] reads its settings from.
///
/// ```rust,ignore
/// let runtime = ParleyRuntime::builder()
///     .config_file("deploy/parley.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Starts from the current directory and `PARLEY_*` variables.
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new().with_current_dir(),
        }
    }

    fn map(self, f: impl FnOnce(ConfigLoader) -> ConfigLoader) -> Self {
        Self {
            loader: f(self.loader),
        }
    }

    /// See [`ConfigLoader::file`].
    pub fn config_file(self, path: impl AsRef<Path>) -> Self {
        self.map(|loader| loader.file(path))
    }

    pub fn profile(self, profile: impl AsRef<str>) -> Self {
        self.map(|loader| loader.profile(profile))
    }

    pub fn search_path(self, dir: impl AsRef<Path>) -> Self {
        self.map(|loader| loader.search_path(dir))
    }

    pub fn with_env(self) -> Self {
        self.map(ConfigLoader::with_env)
    }

    pub fn without_env(self) -> Self {
        self.map(ConfigLoader::without_env)
    }

    /// See [`ConfigLoader::merge`].
    pub fn merge(self, config: ParleyConfig) -> Self {
        self.map(|loader| loader.merge(config))
    }

    pub fn build(self) -> ConfigResult<ParleyRuntime> {
        self.loader.load().map(|config| ParleyRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
