//! Shared fixtures for the router integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use parley_core::{
    ConversationKey, ConversationState, MemoryStateStore, MessageId, Reply, SendResult, Sender,
    StateError, StateResult, StateStore,
};

/// A sender that records every reply.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(i64, Reply)>>,
}

impl RecordingSender {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<(i64, Reply)> {
        self.sent.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(_, reply)| match reply {
                Reply::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send(&self, chat_id: i64, reply: Reply) -> SendResult<MessageId> {
        let mut sent = self.sent.lock();
        sent.push((chat_id, reply));
        Ok(sent.len() as MessageId)
    }
}

/// A memory store that counts `get` calls and can be told to fail them.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStateStore,
    gets: AtomicUsize,
    fail_gets: AtomicBool,
}

impl CountingStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub async fn label(&self, key: ConversationKey) -> Option<String> {
        self.inner.get(key).await.ok().map(|state| state.label)
    }
}

#[async_trait]
impl StateStore for CountingStore {
    async fn get(&self, key: ConversationKey) -> StateResult<ConversationState> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StateError::backend("connection reset"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: ConversationKey, state: ConversationState) -> StateResult<()> {
        self.inner.set(key, state).await
    }

    async fn delete(&self, key: ConversationKey) -> StateResult<()> {
        self.inner.delete(key).await
    }

    async fn get_field(&self, key: ConversationKey, field: &str) -> StateResult<Option<String>> {
        self.inner.get_field(key, field).await
    }

    async fn merge_data(
        &self,
        key: ConversationKey,
        partial: HashMap<String, String>,
    ) -> StateResult<()> {
        self.inner.merge_data(key, partial).await
    }
}
