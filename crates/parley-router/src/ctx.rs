//! The per-event context handed to filters, middleware and handlers.
//!
//! A [`Ctx`] is pooled: the router borrows one for each event, installs the
//! event, runs the matching route and hands the context back, where it is
//! [reset](Reset) before it can be borrowed again. Handlers receive it as an
//! `Arc<Ctx>` and must not keep that `Arc` past their own return; a context
//! that is still referenced when its dispatch finishes is discarded by the
//! pool rather than reused.
//!
//! # Conversation state
//!
//! The persisted state of the current conversation is loaded lazily, at most
//! once per dispatch, the first time the router evaluates a conversation
//! route. The loaded copy is mirrored on every write through the context, so
//! later reads in the same dispatch see the update:
//!
//! ```rust,ignore
//! async fn ask_name(ctx: Arc<Ctx>) -> Result<(), BoxError> {
//!     ctx.reply("What's your name?").await?;
//!     ctx.update_state("awaiting_name", HashMap::new()).await?;
//!     assert_eq!(ctx.state_label().as_deref(), Some("awaiting_name"));
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tower::{BoxError, ServiceExt};
use tracing::trace;

use parley_core::{
    BoxedSender, BoxedStateStore, CallbackData, Command, ConversationKey, ConversationState, Event,
    MessageId, Reply, SendResult, StateResult,
};

use crate::handler::BoxedHandler;
use crate::pool::Reset;

/// The mutable, reusable context of one event dispatch.
pub struct Ctx {
    event: Event,
    sender: BoxedSender,
    store: BoxedStateStore,
    chain: Mutex<Vec<BoxedHandler>>,
    cursor: AtomicUsize,
    loaded: Mutex<Option<ConversationState>>,
    token: CancellationToken,
}

impl Ctx {
    /// Creates an empty context. Used as the pool factory.
    pub(crate) fn new(sender: BoxedSender, store: BoxedStateStore) -> Self {
        Self {
            event: Event::default(),
            sender,
            store,
            chain: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            loaded: Mutex::new(None),
            token: CancellationToken::new(),
        }
    }

    /// Creates a stand-alone context for `event`, outside any router.
    ///
    /// Useful for calling handlers directly, e.g. in tests.
    pub fn detached(event: Event, sender: BoxedSender, store: BoxedStateStore) -> Arc<Self> {
        let mut ctx = Self::new(sender, store);
        ctx.install(event, CancellationToken::new());
        Arc::new(ctx)
    }

    /// Installs a fresh event. The context must have been reset.
    pub(crate) fn install(&mut self, event: Event, token: CancellationToken) {
        self.event = event;
        self.token = token;
    }

    // ─── Event access ─────────────────────────────────────────────────────────

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn user_id(&self) -> i64 {
        self.event.user_id
    }

    pub fn chat_id(&self) -> i64 {
        self.event.chat_id
    }

    /// The key of this event's conversation state row.
    pub fn conversation(&self) -> ConversationKey {
        self.event.conversation()
    }

    /// Message text, if the event is a text message.
    pub fn text(&self) -> Option<&str> {
        self.event.text()
    }

    /// The bot command carried by the message text, if any.
    pub fn command(&self) -> Option<Command<'_>> {
        self.event.command()
    }

    /// Decoded inline-button payload. `None` for other events and for
    /// payloads that do not follow the callback encoding.
    pub fn callback(&self) -> Option<CallbackData> {
        self.event.decoded_callback()
    }

    /// Per-event cancellation token.
    ///
    /// Cancelled once the dispatch is over, including for a context kept
    /// alive past it, or when the router gives up waiting for in-flight work
    /// during shutdown. Long-running handlers can
    /// select on it to stop early.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    // ─── Outbound ─────────────────────────────────────────────────────────────

    pub fn sender(&self) -> &BoxedSender {
        &self.sender
    }

    /// Sends a reply to the chat this event came from.
    pub async fn send(&self, reply: impl Into<Reply>) -> SendResult<MessageId> {
        self.sender.send(self.chat_id(), reply.into()).await
    }

    /// Sends a plain text reply.
    pub async fn reply(&self, text: impl Into<String>) -> SendResult<MessageId> {
        self.send(Reply::text(text)).await
    }

    // ─── Handler chain ────────────────────────────────────────────────────────

    /// Replaces the handler chain and rewinds the cursor.
    pub(crate) fn set_chain(&self, chain: Vec<BoxedHandler>) {
        *self.chain.lock() = chain;
        self.cursor.store(0, Ordering::SeqCst);
    }

    /// Runs the next handler of the installed chain.
    ///
    /// Returns `Ok(())` once the chain is exhausted.
    pub async fn next(self: &Arc<Self>) -> Result<(), BoxError> {
        let handler = {
            let chain = self.chain.lock();
            let at = self.cursor.fetch_add(1, Ordering::SeqCst);
            chain.get(at).cloned()
        };
        match handler {
            Some(handler) => handler.oneshot(Arc::clone(self)).await,
            None => Ok(()),
        }
    }

    /// Position of the next handler in the chain.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Number of handlers in the installed chain.
    pub fn chain_len(&self) -> usize {
        self.chain.lock().len()
    }

    // ─── Conversation state ───────────────────────────────────────────────────

    pub fn store(&self) -> &BoxedStateStore {
        &self.store
    }

    /// The state loaded for this dispatch, if it has been loaded.
    pub fn loaded_state(&self) -> Option<ConversationState> {
        self.loaded.lock().clone()
    }

    /// Label of the loaded state, if it has been loaded.
    pub fn state_label(&self) -> Option<String> {
        self.loaded.lock().as_ref().map(|state| state.label.clone())
    }

    /// Runs `f` against the loaded state without cloning it.
    pub fn with_loaded_state<R>(&self, f: impl FnOnce(Option<&ConversationState>) -> R) -> R {
        f(self.loaded.lock().as_ref())
    }

    /// Loads the conversation state unless this dispatch already did.
    ///
    /// A missing row becomes the empty default state.
    pub(crate) async fn ensure_state_loaded(&self) -> StateResult<()> {
        if self.loaded.lock().is_some() {
            return Ok(());
        }

        let key = self.conversation();
        let state = match self.store.get(key).await {
            Ok(state) => state,
            Err(err) if err.is_not_found() => ConversationState::default(),
            Err(err) => return Err(err),
        };
        trace!(conversation = %key, label = %state.label, "Loaded conversation state");
        *self.loaded.lock() = Some(state);
        Ok(())
    }

    /// Reads the persisted state straight from the store.
    ///
    /// Returns `Ok(None)` when no row exists, so a handler can tell a new
    /// conversation from one explicitly set to the empty state.
    pub async fn fetch_state(&self) -> StateResult<Option<ConversationState>> {
        match self.store.get(self.conversation()).await {
            Ok(state) => Ok(Some(state)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Reads the persisted state, mapping a missing row to the empty state.
    pub async fn get_state(&self) -> StateResult<ConversationState> {
        Ok(self.fetch_state().await?.unwrap_or_default())
    }

    /// Upserts the conversation state and mirrors it into the loaded state.
    pub async fn update_state(
        &self,
        label: impl Into<String>,
        data: HashMap<String, String>,
    ) -> StateResult<()> {
        let state = ConversationState::new(label, data);
        self.store.set(self.conversation(), state.clone()).await?;
        *self.loaded.lock() = Some(state);
        Ok(())
    }

    /// Deletes the persisted state. Clearing a missing row succeeds.
    pub async fn clear_state(&self) -> StateResult<()> {
        self.store.delete(self.conversation()).await?;
        *self.loaded.lock() = Some(ConversationState::default());
        Ok(())
    }

    /// Reads one field of the auxiliary data map.
    pub async fn get_state_field(&self, key: &str) -> StateResult<Option<String>> {
        self.store.get_field(self.conversation(), key).await
    }

    /// Merges `partial` into the auxiliary data map, keeping the label.
    pub async fn merge_state_data(&self, partial: HashMap<String, String>) -> StateResult<()> {
        self.store
            .merge_data(self.conversation(), partial.clone())
            .await?;
        if let Some(state) = self.loaded.lock().as_mut() {
            state.data.extend(partial);
        }
        Ok(())
    }
}

impl Reset for Ctx {
    fn reset(&mut self) {
        self.event = Event::default();
        self.chain.get_mut().clear();
        *self.cursor.get_mut() = 0;
        *self.loaded.get_mut() = None;
        self.token.cancel();
        self.token = CancellationToken::new();
    }

    fn retire(&self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for Ctx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ctx")
            .field("event", &self.event)
            .field("chain_len", &self.chain_len())
            .field("cursor", &self.cursor())
            .field("loaded", &self.loaded_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::into_handler;
    use crate::pool::Pool;
    use async_trait::async_trait;
    use parley_core::{MemoryStateStore, Sender, StateStore};
    use std::sync::atomic::AtomicBool;

    struct NullSender;

    #[async_trait]
    impl Sender for NullSender {
        async fn send(&self, _chat_id: i64, _reply: Reply) -> SendResult<MessageId> {
            Ok(0)
        }
    }

    fn fresh() -> Ctx {
        Ctx::new(Arc::new(NullSender), MemoryStateStore::shared())
    }

    #[tokio::test]
    async fn test_reset_clears_dispatch_state() {
        let pool = Pool::new(fresh);
        let token = {
            let mut slot = pool.acquire();
            let ctx = slot.get_mut().unwrap();
            let token = CancellationToken::new();
            ctx.install(Event::message(1, 10, 20, "hi"), token.child_token());
            let token = ctx.cancellation().clone();

            let ctx = slot.share().unwrap();
            ctx.set_chain(vec![into_handler(|_ctx: Arc<Ctx>| async {})]);
            ctx.ensure_state_loaded().await.unwrap();
            ctx.next().await.unwrap();
            assert_eq!(ctx.cursor(), 1);
            token
        };
        assert!(token.is_cancelled());

        let slot = pool.acquire();
        let ctx = slot.share().unwrap();
        assert_eq!(pool.created(), 1);
        assert_eq!(ctx.chain_len(), 0);
        assert_eq!(ctx.cursor(), 0);
        assert!(ctx.loaded_state().is_none());
        assert_eq!(ctx.event(), &Event::default());
        assert!(!ctx.cancellation().is_cancelled());
    }

    #[test]
    fn test_retained_context_is_cancelled() {
        let pool = Pool::new(fresh);
        let kept = {
            let mut slot = pool.acquire();
            let token = CancellationToken::new();
            slot.get_mut()
                .unwrap()
                .install(Event::message(1, 10, 20, "hi"), token.child_token());
            slot.share().unwrap()
        };
        assert_eq!(pool.discarded(), 1);
        assert!(kept.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn test_next_walks_the_chain() {
        let ctx = Arc::new(fresh());
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        ctx.set_chain(vec![into_handler(move |_ctx: Arc<Ctx>| {
            let flag = flag.clone();
            async move { flag.store(true, Ordering::SeqCst) }
        })]);

        ctx.next().await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
        // Past the end of the chain is a no-op.
        ctx.next().await.unwrap();
        assert_eq!(ctx.cursor(), 2);
    }

    #[tokio::test]
    async fn test_missing_row_is_the_default_state() {
        let store = MemoryStateStore::shared();
        let ctx = Ctx::detached(Event::message(1, 5, 5, "x"), Arc::new(NullSender), store.clone());

        assert_eq!(ctx.fetch_state().await.unwrap(), None);
        let implicit = ctx.get_state().await.unwrap();

        ctx.update_state("", HashMap::new()).await.unwrap();
        assert_eq!(ctx.fetch_state().await.unwrap(), Some(ConversationState::default()));
        assert_eq!(ctx.get_state().await.unwrap(), implicit);
    }

    #[tokio::test]
    async fn test_writes_are_mirrored() {
        let store = MemoryStateStore::shared();
        let ctx = Ctx::detached(Event::message(1, 5, 6, "x"), Arc::new(NullSender), store.clone());
        ctx.ensure_state_loaded().await.unwrap();
        assert_eq!(ctx.state_label().as_deref(), Some(""));

        ctx.update_state("awaiting_name", HashMap::new()).await.unwrap();
        assert_eq!(ctx.state_label().as_deref(), Some("awaiting_name"));

        let partial = HashMap::from([("name".to_string(), "Ada".to_string())]);
        ctx.merge_state_data(partial).await.unwrap();
        assert_eq!(ctx.loaded_state().unwrap().field("name"), Some("Ada"));
        assert_eq!(
            ctx.get_state_field("name").await.unwrap().as_deref(),
            Some("Ada")
        );

        let persisted = store.get(ctx.conversation()).await.unwrap();
        assert_eq!(persisted.label, "awaiting_name");
    }

    #[tokio::test]
    async fn test_clear_state_twice() {
        let store = MemoryStateStore::shared();
        let ctx = Ctx::detached(Event::message(1, 7, 7, "x"), Arc::new(NullSender), store.clone());
        ctx.update_state("checkout", HashMap::new()).await.unwrap();

        ctx.clear_state().await.unwrap();
        let first = ctx.get_state().await.unwrap();
        ctx.clear_state().await.unwrap();
        let second = ctx.get_state().await.unwrap();

        assert_eq!(first, second);
        assert!(second.is_empty());
        assert_eq!(ctx.loaded_state(), Some(ConversationState::default()));
        assert!(store.is_empty());
    }
}
