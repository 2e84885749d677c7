//! Inbound event model.
//!
//! An [`Event`] is one discrete update handed over by the platform: a text
//! message, a sticker, an inline-button press or a payment notification.
//! Every event belongs to exactly one conversation, identified by the
//! `(user_id, chat_id)` pair ([`ConversationKey`]).
//!
//! Events are serde-friendly so that sources can decode them straight from
//! a long-poll response or a JSON-lines feed:
//!
//! ```json
//! {"id": 7, "user_id": 42, "chat_id": 42, "type": "message", "text": "/start"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::callback::CallbackData;

/// Identifies the conversation an event belongs to.
///
/// This is the key of the conversation state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub user_id: i64,
    pub chat_id: i64,
}

impl ConversationKey {
    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self { user_id, chat_id }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.chat_id)
    }
}

/// The payload of an inbound event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A text message (commands included).
    Message { text: String },

    /// A sticker message.
    Sticker {
        file_id: String,
        #[serde(default)]
        emoji: Option<String>,
    },

    /// An inline-button press carrying opaque callback data.
    Callback {
        data: String,
        #[serde(default)]
        message_id: Option<i64>,
    },

    /// A payment notification from the platform's payment flow.
    Payment {
        payload: String,
        currency: String,
        total_amount: i64,
    },

    /// Anything the router has no predicate category for.
    #[default]
    Unsupported,
}

/// One inbound platform event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Platform update id.
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Creates an event with an explicit payload.
    pub fn new(id: i64, user_id: i64, chat_id: i64, kind: EventKind) -> Self {
        Self {
            id,
            user_id,
            chat_id,
            kind,
        }
    }

    /// Creates a text message event.
    pub fn message(id: i64, user_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self::new(id, user_id, chat_id, EventKind::Message { text: text.into() })
    }

    /// Creates a callback event from raw callback data.
    pub fn callback(id: i64, user_id: i64, chat_id: i64, data: impl Into<String>) -> Self {
        Self::new(
            id,
            user_id,
            chat_id,
            EventKind::Callback {
                data: data.into(),
                message_id: None,
            },
        )
    }

    /// Returns the conversation this event belongs to.
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(self.user_id, self.chat_id)
    }

    /// Returns the message text, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Message { text } => Some(text),
            _ => None,
        }
    }

    /// Returns the raw callback data, if this is a button press.
    pub fn callback_data(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Callback { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Parses the message text as a bot command.
    pub fn command(&self) -> Option<Command<'_>> {
        self.text().and_then(Command::parse)
    }

    /// Decodes the callback data. Malformed payloads yield `None`.
    pub fn decoded_callback(&self) -> Option<CallbackData> {
        self.callback_data().and_then(|d| d.parse().ok())
    }

    pub fn is_message(&self) -> bool {
        matches!(self.kind, EventKind::Message { .. })
    }

    pub fn is_sticker(&self) -> bool {
        matches!(self.kind, EventKind::Sticker { .. })
    }

    pub fn is_callback(&self) -> bool {
        matches!(self.kind, EventKind::Callback { .. })
    }

    pub fn is_payment(&self) -> bool {
        matches!(self.kind, EventKind::Payment { .. })
    }

    /// Short name of the payload variant, for log fields.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            EventKind::Message { .. } => "message",
            EventKind::Sticker { .. } => "sticker",
            EventKind::Callback { .. } => "callback",
            EventKind::Payment { .. } => "payment",
            EventKind::Unsupported => "unsupported",
        }
    }
}

/// A parsed bot command such as `/start` or `/order@shop_bot 3 pizzas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    /// Command name without the leading slash.
    pub name: &'a str,
    /// Bot username following `@`, when addressed explicitly.
    pub mention: Option<&'a str>,
    /// Everything after the command token, with leading whitespace trimmed.
    pub args: &'a str,
}

impl<'a> Command<'a> {
    /// Parses `text` as a command. Returns `None` unless the text starts with
    /// `/` followed by a non-empty `[A-Za-z0-9_]` name.
    pub fn parse(text: &'a str) -> Option<Self> {
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.find(char::is_whitespace) {
            Some(at) => (&rest[..at], rest[at..].trim_start()),
            None => (rest, ""),
        };
        let (name, mention) = match head.split_once('@') {
            Some((name, bot)) if !bot.is_empty() => (name, Some(bot)),
            Some(_) => return None,
            None => (head, None),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        Some(Self {
            name,
            mention,
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        let cmd = Command::parse("/start").unwrap();
        assert_eq!(cmd.name, "start");
        assert_eq!(cmd.args, "");
        assert_eq!(cmd.mention, None);

        let cmd = Command::parse("/order@shop_bot  3 pizzas").unwrap();
        assert_eq!(cmd.name, "order");
        assert_eq!(cmd.mention, Some("shop_bot"));
        assert_eq!(cmd.args, "3 pizzas");
    }

    #[test]
    fn test_command_parse_rejects_plain_text() {
        assert!(Command::parse("start").is_none());
        assert!(Command::parse("/").is_none());
        assert!(Command::parse("/ start").is_none());
        assert!(Command::parse("/start@").is_none());
        assert!(Command::parse("/héllo").is_none());
    }

    #[test]
    fn test_event_json_shape() {
        let raw = r#"{"id":7,"user_id":42,"chat_id":43,"type":"message","text":"/start"}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.conversation(), ConversationKey::new(42, 43));
        assert_eq!(event.command().map(|c| c.name), Some("start"));

        let raw = r#"{"id":8,"user_id":1,"chat_id":1,"type":"callback","data":"query:add , value:3"}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert!(event.is_callback());
        assert_eq!(event.decoded_callback().unwrap().value, "3");
    }

    #[test]
    fn test_default_event_is_unsupported() {
        let event = Event::default();
        assert_eq!(event.kind, EventKind::Unsupported);
        assert_eq!(event.kind_name(), "unsupported");
        assert!(event.text().is_none());
    }
}
