//! Error types for the Parley collaborator contracts.
//!
//! Router-level errors (dispatch, shutdown) are defined in `parley-router`.

use thiserror::Error;

// =============================================================================
// State Store Errors
// =============================================================================

/// Errors returned by a [`StateStore`](crate::StateStore).
#[derive(Debug, Clone, Error)]
pub enum StateError {
    /// No row exists for the requested conversation.
    ///
    /// The router treats this as the empty default state; handlers that call
    /// the store directly can still observe it.
    #[error("conversation state not found")]
    NotFound,

    /// The backing storage failed (I/O, connection, constraint).
    #[error("state backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("state serialization error: {0}")]
    Serialization(String),
}

impl StateError {
    /// Returns `true` for the benign "no row" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Creates a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Send Errors
// =============================================================================

/// Errors returned by a [`Sender`](crate::Sender).
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The platform rejected the request.
    #[error("platform error ({code}): {message}")]
    Platform { code: i64, message: String },

    /// The transport could not deliver the request.
    #[error("transport error: {0}")]
    Transport(String),

    /// The reply payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SendError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Source Errors
// =============================================================================

/// Returned by [`EventFeed::push`](crate::EventFeed::push) once the receiving
/// side of the feed has been dropped.
#[derive(Debug, Clone, Copy, Error)]
#[error("event source is closed")]
pub struct SourceClosed;

// =============================================================================
// Callback Errors
// =============================================================================

/// Errors produced while decoding inline-button callback data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackParseError {
    /// The payload does not start with `query:`.
    #[error("callback data is missing the 'query:' prefix")]
    MissingQuery,

    /// The payload has no ` , value:` separator.
    #[error("callback data is missing the ' , value:' separator")]
    MissingValue,

    /// The query key is empty.
    #[error("callback query key is empty")]
    EmptyQuery,

    /// The query key contains the ` , value:` separator, so its encoding
    /// would decode to a different key.
    #[error("callback query key contains the ' , value:' separator")]
    SeparatorInQuery,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Result type for outbound sends.
pub type SendResult<T> = Result<T, SendError>;
