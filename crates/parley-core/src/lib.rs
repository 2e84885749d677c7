//! # Parley Core
//!
//! Shared types and collaborator contracts for the Parley chat-bot router.
//!
//! The router itself lives in `parley-router`; this crate only describes the
//! things it talks to:
//!
//! - **Events**: inbound platform updates ([`Event`], [`EventKind`])
//! - **Event sources**: anything that can be drained as a queue ([`EventSource`])
//! - **Outbound sends**: the reply capability handlers reach through the context ([`Sender`])
//! - **Conversation state**: persisted per `(user, chat)` labels and data ([`StateStore`])
//! - **Callback data**: the `query:<k> , value:<v>` inline-button codec ([`CallbackData`])
//!
//! ```text
//! ┌──────────────┐     ┌──────────┐     ┌──────────┐
//! │ EventSource  │────▶│  Router  │────▶│ Handler  │───▶ Sender
//! └──────────────┘     └──────────┘     └──────────┘
//!                            │                │
//!                            └────────────────┴──────▶ StateStore
//! ```

pub mod callback;
pub mod error;
pub mod event;
pub mod sender;
pub mod source;
pub mod state;

pub use callback::CallbackData;
pub use error::{
    CallbackParseError, SendError, SendResult, SourceClosed, StateError, StateResult,
};
pub use event::{Command, ConversationKey, Event, EventKind};
pub use sender::{BoxedSender, Button, MessageId, Reply, Sender};
pub use source::{ChannelSource, EventFeed, EventSource, channel};
pub use state::{BoxedStateStore, ConversationState, MemoryStateStore, StateStore};
