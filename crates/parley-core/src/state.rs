//! Conversation state contract.
//!
//! Each conversation (a `(user_id, chat_id)` pair) may persist a state label
//! plus a small string-to-string map. Conversation routes match on the label;
//! handlers move the conversation along by writing a new one.
//!
//! A missing row means the same thing as `{label: "", data: {}}`. Stores
//! still report it as [`StateError::NotFound`] from [`StateStore::get`] so
//! that callers who care can tell the two apart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{StateError, StateResult};
use crate::event::ConversationKey;

/// The persisted state of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub label: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl ConversationState {
    pub fn new(label: impl Into<String>, data: HashMap<String, String>) -> Self {
        Self {
            label: label.into(),
            data,
        }
    }

    /// Creates a state with the given label and no data.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self::new(label, HashMap::new())
    }

    /// Returns `true` if this is the empty default state.
    pub fn is_empty(&self) -> bool {
        self.label.is_empty() && self.data.is_empty()
    }

    /// Returns a value from the auxiliary map.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// A type-erased, shareable state store.
pub type BoxedStateStore = Arc<dyn StateStore>;

/// Persistence for conversation state.
///
/// Implementations own their concurrency discipline; the router adds no
/// per-conversation serialization of its own, so concurrent `set` calls for
/// the same key must resolve as last-writer-wins.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Loads the state of a conversation, or [`StateError::NotFound`].
    async fn get(&self, key: ConversationKey) -> StateResult<ConversationState>;

    /// Inserts or overwrites the state of a conversation.
    async fn set(&self, key: ConversationKey, state: ConversationState) -> StateResult<()>;

    /// Deletes the state of a conversation. Deleting a missing row succeeds.
    async fn delete(&self, key: ConversationKey) -> StateResult<()>;

    /// Reads a single data field. `Ok(None)` if the row or the key is missing.
    async fn get_field(&self, key: ConversationKey, field: &str) -> StateResult<Option<String>>;

    /// Merges `partial` into the data map without touching the label.
    ///
    /// A missing row is created with an empty label.
    async fn merge_data(
        &self,
        key: ConversationKey,
        partial: HashMap<String, String>,
    ) -> StateResult<()>;
}

/// An in-process [`StateStore`] backed by a `HashMap`.
///
/// Suitable for tests, demos and single-instance bots that can afford to
/// lose conversation state on restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    rows: RwLock<HashMap<ConversationKey, ConversationState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store wrapped in an `Arc`, ready to hand to a router.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the number of persisted conversations.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: ConversationKey) -> StateResult<ConversationState> {
        self.rows
            .read()
            .get(&key)
            .cloned()
            .ok_or(StateError::NotFound)
    }

    async fn set(&self, key: ConversationKey, state: ConversationState) -> StateResult<()> {
        trace!(conversation = %key, label = %state.label, "Upserting conversation state");
        self.rows.write().insert(key, state);
        Ok(())
    }

    async fn delete(&self, key: ConversationKey) -> StateResult<()> {
        self.rows.write().remove(&key);
        Ok(())
    }

    async fn get_field(&self, key: ConversationKey, field: &str) -> StateResult<Option<String>> {
        Ok(self
            .rows
            .read()
            .get(&key)
            .and_then(|row| row.data.get(field).cloned()))
    }

    async fn merge_data(
        &self,
        key: ConversationKey,
        partial: HashMap<String, String>,
    ) -> StateResult<()> {
        self.rows
            .write()
            .entry(key)
            .or_default()
            .data
            .extend(partial);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn key() -> ConversationKey {
        ConversationKey::new(1, 10)
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStateStore::new();
        let err = assert_err!(store.get(key()).await);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStateStore::new();
        assert_ok!(store.set(key(), ConversationState::labeled("a")).await);
        assert_ok!(store.set(key(), ConversationState::labeled("b")).await);
        assert_eq!(store.get(key()).await.unwrap().label, "b");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStateStore::new();
        assert_ok!(store.set(key(), ConversationState::labeled("a")).await);
        assert_ok!(store.delete(key()).await);
        assert_ok!(store.delete(key()).await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_merge_keeps_label() {
        let store = MemoryStateStore::new();
        let mut data = HashMap::new();
        data.insert("size".to_string(), "large".to_string());
        assert_ok!(store.set(key(), ConversationState::new("ordering", data)).await);

        let mut partial = HashMap::new();
        partial.insert("qty".to_string(), "2".to_string());
        assert_ok!(store.merge_data(key(), partial).await);

        let state = store.get(key()).await.unwrap();
        assert_eq!(state.label, "ordering");
        assert_eq!(state.field("size"), Some("large"));
        assert_eq!(state.field("qty"), Some("2"));
    }

    #[tokio::test]
    async fn test_merge_creates_missing_row() {
        let store = MemoryStateStore::new();
        let mut partial = HashMap::new();
        partial.insert("qty".to_string(), "1".to_string());
        assert_ok!(store.merge_data(key(), partial).await);

        let state = store.get(key()).await.unwrap();
        assert_eq!(state.label, "");
        assert_eq!(
            store.get_field(key(), "qty").await.unwrap().as_deref(),
            Some("1")
        );
        assert_eq!(store.get_field(key(), "missing").await.unwrap(), None);
    }
}
