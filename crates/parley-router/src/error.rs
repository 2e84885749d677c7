//! Error types for the router.

use std::time::Duration;

use thiserror::Error;

use parley_core::StateError;

/// Errors that abort the dispatch of a single event.
///
/// The worker logs these and drops the event; nothing is retried.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Lazily loading the conversation state failed for a reason other than
    /// a missing row.
    #[error("failed to load conversation state: {0}")]
    StateLoad(#[from] StateError),
}

/// Errors returned by [`Router::shutdown`](crate::Router::shutdown).
#[derive(Debug, Clone, Error)]
pub enum ShutdownError {
    /// Workers were still busy when the hard drain deadline elapsed.
    #[error("drain deadline of {deadline:?} elapsed with {in_flight} task(s) still running")]
    DrainTimeout {
        /// The configured hard deadline.
        deadline: Duration,
        /// Number of tracked tasks that had not exited.
        in_flight: usize,
    },
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
