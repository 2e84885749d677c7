//! Route filters.
//!
//! A [`Filter`] is a predicate over a [`Ctx`] tagged with the category of
//! events it selects. The category decides the route kind: only
//! [`Filter::State`] depends on persisted conversation state, so only it
//! yields [`RouteKind::Conversation`] and triggers the lazy state load.
//!
//! Filters never fail. Anything that cannot be parsed (a non-command text,
//! a malformed callback payload) simply does not match.

use std::fmt;
use std::sync::Arc;

use crate::ctx::Ctx;
use crate::route::RouteKind;

/// A type-erased predicate.
pub type Predicate = Arc<dyn Fn(&Ctx) -> bool + Send + Sync>;

/// A categorized predicate deciding whether a route handles an event.
#[derive(Clone)]
pub enum Filter {
    /// Text messages, commands included.
    Message(Predicate),
    /// A bot command with the given name.
    Command { name: Arc<str>, predicate: Predicate },
    /// Sticker messages.
    Sticker(Predicate),
    /// Conversations whose state label equals `label`.
    State { label: Arc<str>, predicate: Predicate },
    /// Inline-button presses carrying the given callback query key.
    Callback { query: Arc<str>, predicate: Predicate },
    /// Payment notifications.
    Payment(Predicate),
    /// Every event. Register it last.
    Any(Predicate),
}

impl Filter {
    /// Matches every text message.
    pub fn message() -> Self {
        Self::Message(Arc::new(|ctx: &Ctx| ctx.event().is_message()))
    }

    /// Matches text messages whose text equals `expected`.
    pub fn text(expected: impl Into<String>) -> Self {
        let expected = expected.into();
        Self::Message(Arc::new(move |ctx: &Ctx| ctx.text() == Some(expected.as_str())))
    }

    /// Matches `/name` commands. A leading slash in `name` is ignored.
    pub fn command(name: impl AsRef<str>) -> Self {
        let name: Arc<str> = Arc::from(name.as_ref().trim_start_matches('/'));
        let wanted = name.clone();
        Self::Command {
            name,
            predicate: Arc::new(move |ctx: &Ctx| {
                ctx.command().is_some_and(|cmd| cmd.name == &*wanted)
            }),
        }
    }

    pub fn sticker() -> Self {
        Self::Sticker(Arc::new(|ctx: &Ctx| ctx.event().is_sticker()))
    }

    /// Matches conversations whose loaded state label equals `label`.
    ///
    /// Before the router has loaded the state this never matches.
    pub fn state(label: impl Into<String>) -> Self {
        let label: Arc<str> = Arc::from(label.into());
        let wanted = label.clone();
        Self::State {
            label,
            predicate: Arc::new(move |ctx: &Ctx| {
                ctx.with_loaded_state(|state| state.is_some_and(|s| s.label == *wanted))
            }),
        }
    }

    /// Matches button presses whose decoded callback query equals `query`.
    pub fn callback(query: impl Into<String>) -> Self {
        let query: Arc<str> = Arc::from(query.into());
        let wanted = query.clone();
        Self::Callback {
            query,
            predicate: Arc::new(move |ctx: &Ctx| {
                ctx.callback().is_some_and(|data| data.query == *wanted)
            }),
        }
    }

    pub fn payment() -> Self {
        Self::Payment(Arc::new(|ctx: &Ctx| ctx.event().is_payment()))
    }

    pub fn any() -> Self {
        Self::Any(Arc::new(|_: &Ctx| true))
    }

    /// Narrows this filter with an extra condition, keeping its category.
    pub fn and<F>(self, extra: F) -> Self
    where
        F: Fn(&Ctx) -> bool + Send + Sync + 'static,
    {
        let combine = |base: Predicate| -> Predicate {
            Arc::new(move |ctx: &Ctx| base(ctx) && extra(ctx))
        };
        match self {
            Self::Message(p) => Self::Message(combine(p)),
            Self::Command { name, predicate } => Self::Command {
                name,
                predicate: combine(predicate),
            },
            Self::Sticker(p) => Self::Sticker(combine(p)),
            Self::State { label, predicate } => Self::State {
                label,
                predicate: combine(predicate),
            },
            Self::Callback { query, predicate } => Self::Callback {
                query,
                predicate: combine(predicate),
            },
            Self::Payment(p) => Self::Payment(combine(p)),
            Self::Any(p) => Self::Any(combine(p)),
        }
    }

    /// Evaluates the predicate.
    pub fn matches(&self, ctx: &Ctx) -> bool {
        (self.predicate())(ctx)
    }

    fn predicate(&self) -> &Predicate {
        match self {
            Self::Message(p) | Self::Sticker(p) | Self::Payment(p) | Self::Any(p) => p,
            Self::Command { predicate, .. }
            | Self::State { predicate, .. }
            | Self::Callback { predicate, .. } => predicate,
        }
    }

    /// The route kind this filter produces.
    pub fn kind(&self) -> RouteKind {
        match self {
            Self::State { .. } => RouteKind::Conversation,
            _ => RouteKind::Plain,
        }
    }

    /// Short category name, for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Command { .. } => "command",
            Self::Sticker(_) => "sticker",
            Self::State { .. } => "state",
            Self::Callback { .. } => "callback",
            Self::Payment(_) => "payment",
            Self::Any(_) => "any",
        }
    }

    /// Human-readable description, used as the default route name.
    pub fn describe(&self) -> String {
        match self {
            Self::Command { name, .. } => format!("command:/{name}"),
            Self::State { label, .. } => format!("state:{label}"),
            Self::Callback { query, .. } => format!("callback:{query}"),
            other => other.category().to_string(),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.describe()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::{
        CallbackData, Event, EventKind, MemoryStateStore, MessageId, Reply, SendResult, Sender,
    };

    struct NullSender;

    #[async_trait]
    impl Sender for NullSender {
        async fn send(&self, _chat_id: i64, _reply: Reply) -> SendResult<MessageId> {
            Ok(0)
        }
    }

    fn ctx(event: Event) -> Arc<Ctx> {
        Ctx::detached(event, Arc::new(NullSender), MemoryStateStore::shared())
    }

    #[test]
    fn test_kind_is_derived_from_category() {
        assert_eq!(Filter::state("x").kind(), RouteKind::Conversation);
        assert_eq!(
            Filter::state("x").and(|_| true).kind(),
            RouteKind::Conversation
        );
        for plain in [
            Filter::message(),
            Filter::command("start"),
            Filter::sticker(),
            Filter::callback("add"),
            Filter::payment(),
            Filter::any(),
        ] {
            assert_eq!(plain.kind(), RouteKind::Plain, "{plain:?}");
        }
    }

    #[test]
    fn test_command_filter() {
        let start = Filter::command("/start");
        assert!(start.matches(&ctx(Event::message(1, 1, 1, "/start"))));
        assert!(start.matches(&ctx(Event::message(1, 1, 1, "/start@bot now"))));
        assert!(!start.matches(&ctx(Event::message(1, 1, 1, "/stop"))));
        assert!(!start.matches(&ctx(Event::message(1, 1, 1, "start"))));
        assert_eq!(start.describe(), "command:/start");
    }

    #[test]
    fn test_message_filters() {
        let hello = ctx(Event::message(1, 1, 1, "hello"));
        assert!(Filter::message().matches(&hello));
        assert!(Filter::text("hello").matches(&hello));
        assert!(!Filter::text("hell").matches(&hello));
        assert!(!Filter::message().matches(&ctx(Event::callback(1, 1, 1, "x"))));
    }

    #[test]
    fn test_callback_filter_ignores_malformed_payloads() {
        let add = Filter::callback("add");
        let encoded = CallbackData::new("add", "pizza").encode().unwrap();
        assert!(add.matches(&ctx(Event::callback(1, 1, 1, encoded))));
        assert!(!add.matches(&ctx(Event::callback(1, 1, 1, "add:pizza"))));
        assert!(!add.matches(&ctx(Event::callback(1, 1, 1, "query:remove , value:1"))));
    }

    #[test]
    fn test_kind_filters() {
        let sticker = ctx(Event::new(
            1,
            1,
            1,
            EventKind::Sticker {
                file_id: "f".into(),
                emoji: None,
            },
        ));
        assert!(Filter::sticker().matches(&sticker));
        assert!(!Filter::payment().matches(&sticker));
        assert!(Filter::any().matches(&sticker));
    }

    #[tokio::test]
    async fn test_state_filter_needs_loaded_state() {
        let c = ctx(Event::message(1, 1, 1, "Ada"));
        let idle = Filter::state("");
        assert!(!idle.matches(&c));

        c.ensure_state_loaded().await.unwrap();
        assert!(idle.matches(&c));
        assert!(!Filter::state("awaiting_name").matches(&c));
    }

    #[test]
    fn test_and_narrows() {
        let long = Filter::message().and(|ctx| ctx.text().is_some_and(|t| t.len() > 3));
        assert!(long.matches(&ctx(Event::message(1, 1, 1, "hello"))));
        assert!(!long.matches(&ctx(Event::message(1, 1, 1, "hi"))));
        assert_eq!(long.category(), "message");
    }
}
