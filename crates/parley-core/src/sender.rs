//! Outbound send capability.
//!
//! Handlers reply through a [`Sender`] reached via the event context. The
//! router neither validates nor rate-limits these calls; formatting and
//! delivery are entirely the implementation's business.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::callback::CallbackData;
use crate::error::{CallbackParseError, SendResult};

/// Platform id of a sent message.
pub type MessageId = i64;

/// A type-erased, shareable sender.
pub type BoxedSender = Arc<dyn Sender>;

/// An inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    /// Encoded [`CallbackData`] delivered back when the button is pressed.
    pub callback_data: String,
}

impl Button {
    /// Creates a button whose press routes to callback filters on
    /// `data.query`. Fails if the key would not survive encoding.
    pub fn callback(
        text: impl Into<String>,
        data: &CallbackData,
    ) -> Result<Self, CallbackParseError> {
        Ok(Self {
            text: text.into(),
            callback_data: data.encode()?,
        })
    }
}

/// A reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// Plain text.
    Text { text: String },

    /// Text with an inline keyboard, one inner `Vec` per row.
    Keyboard {
        text: String,
        buttons: Vec<Vec<Button>>,
    },

    /// A photo or document by URL.
    Media {
        url: String,
        #[serde(default)]
        caption: Option<String>,
    },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn keyboard(text: impl Into<String>, buttons: Vec<Vec<Button>>) -> Self {
        Self::Keyboard {
            text: text.into(),
            buttons,
        }
    }

    pub fn media(url: impl Into<String>, caption: Option<String>) -> Self {
        Self::Media {
            url: url.into(),
            caption,
        }
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::Text { text }
    }
}

/// The outbound half of a platform connection.
#[async_trait]
pub trait Sender: Send + Sync + 'static {
    /// Sends `reply` to `chat_id` and returns the id of the sent message.
    async fn send(&self, chat_id: i64, reply: Reply) -> SendResult<MessageId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_button_encodes_data() {
        let button = Button::callback("Add", &CallbackData::new("add_to_cart", "7")).unwrap();
        assert_eq!(button.callback_data, "query:add_to_cart , value:7");

        let bad = CallbackData::new("add , value:x", "7");
        assert_eq!(
            Button::callback("Add", &bad),
            Err(CallbackParseError::SeparatorInQuery)
        );
    }

    #[test]
    fn test_reply_json_shape() {
        let json = serde_json::to_value(Reply::text("hi")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");
    }
}
