//! Inbound event source contract.
//!
//! The router only needs to drain events one at a time until the source
//! closes. Long-poll clients, webhook receivers and test harnesses all fit
//! behind [`EventSource`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SourceClosed;
use crate::event::Event;

/// A sequential feed of inbound events.
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Waits for the next event. `None` means the source is closed for good.
    async fn recv(&mut self) -> Option<Event>;
}

#[async_trait]
impl EventSource for mpsc::Receiver<Event> {
    async fn recv(&mut self) -> Option<Event> {
        mpsc::Receiver::recv(self).await
    }
}

#[async_trait]
impl EventSource for Box<dyn EventSource> {
    async fn recv(&mut self) -> Option<Event> {
        (**self).recv().await
    }
}

/// Creates a bounded, channel-backed source and the feed that fills it.
///
/// Pushing blocks while `capacity` events are waiting to be drained.
pub fn channel(capacity: usize) -> (EventFeed, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventFeed { tx }, ChannelSource { rx })
}

/// The producing half of [`channel`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventFeed {
    tx: mpsc::Sender<Event>,
}

impl EventFeed {
    /// Queues an event, waiting for capacity.
    pub async fn push(&self, event: Event) -> Result<(), SourceClosed> {
        self.tx.send(event).await.map_err(|_| SourceClosed)
    }

    /// Returns `true` once the source side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The consuming half of [`channel`]. Closes when every [`EventFeed`] is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Event>,
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
