//! Runtime error types.

use thiserror::Error;

use parley_router::ShutdownError;

/// Errors that can occur while running a router under the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The router did not drain within its deadline.
    #[error("Shutdown failed: {0}")]
    Shutdown(#[from] ShutdownError),

    /// The router's event source was already consumed by an earlier `listen`.
    #[error("Router is already listening")]
    AlreadyListening,

    /// A process signal handler could not be registered.
    #[error("Failed to register signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
