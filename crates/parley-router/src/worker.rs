//! Event intake and the worker loops.
//!
//! One pump task drains the [`EventSource`] into bounded queues; worker
//! tasks pull from those queues and serve each event to completion. In
//! shared mode all workers pull from a single queue. In sharded mode each
//! worker owns one queue and the pump picks it by conversation, so the
//! events of one conversation are served in order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use parley_core::{ConversationKey, Event, EventSource};

use crate::router::Router;

/// Picks the shard queue serving `key`.
pub(crate) fn shard_for(key: &ConversationKey, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

/// Moves events from the source into the worker queues until the source
/// closes or `token` fires. Dropping the queues then stops the workers.
pub(crate) async fn pump(
    mut source: Box<dyn EventSource>,
    queues: Vec<mpsc::Sender<Event>>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = source.recv() => match event {
                Some(event) => event,
                None => {
                    info!("Event source closed");
                    break;
                }
            },
        };

        let queue = &queues[shard_for(&event.conversation(), queues.len())];
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            sent = queue.send(event) => {
                if sent.is_err() {
                    debug!("Worker queue closed, stopping intake");
                    break;
                }
            }
        }
    }
    trace!("Pump exited");
}

/// A worker pulling from the queue shared by all workers.
pub(crate) async fn shared_worker(
    id: usize,
    router: Router,
    queue: Arc<Mutex<mpsc::Receiver<Event>>>,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            event = async { queue.lock().await.recv().await } => event,
        };
        let Some(event) = next else { break };
        router.serve_event(event).await;
    }
    trace!(worker = id, "Worker exited");
}

/// A worker owning one shard queue.
pub(crate) async fn shard_worker(
    id: usize,
    router: Router,
    mut queue: mpsc::Receiver<Event>,
    token: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            event = queue.recv() => event,
        };
        let Some(event) = next else { break };
        router.serve_event(event).await;
    }
    trace!(worker = id, "Worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_is_stable_and_in_range() {
        let key = ConversationKey::new(42, 7);
        let shard = shard_for(&key, 8);
        assert!(shard < 8);
        assert_eq!(shard, shard_for(&key, 8));
        assert_eq!(shard_for(&key, 1), 0);
        assert_eq!(shard_for(&key, 0), 0);
    }
}
