//! Change-event broadcast hub.
//!
//! The bus owns the set of live subscriber queues. Publishing is a
//! non-blocking `try_send` to each queue; a subscriber whose queue is full
//! or closed is treated as unresponsive and removed within the same publish
//! call, so one slow consumer can never stall the publisher or its peers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use protocol::messages::ChangeEvent;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Broadcast hub fanning change events out to every open event stream.
///
/// Cheap to clone; all clones share one subscriber set.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    inner: Arc<BusInner>,
}

#[derive(Debug)]
struct BusInner {
    subscribers: DashMap<Uuid, mpsc::Sender<ChangeEvent>>,
    capacity: usize,
}

impl ChangeBus {
    /// Create a bus whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: DashMap::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a new subscriber queue.
    ///
    /// The returned [`Subscription`] deregisters itself on drop, so every
    /// exit path of a notification stream cleans up its queue.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = Uuid::new_v4();
        self.inner.subscribers.insert(id, tx);
        tracing::debug!(
            subscriber = %id,
            total = self.inner.subscribers.len(),
            "Subscriber registered"
        );
        Subscription {
            id,
            rx,
            bus: self.clone(),
        }
    }

    /// Fan `event` out to every live subscriber without blocking.
    ///
    /// Queues that are full or whose receiver is gone are pruned here.
    pub fn publish(&self, event: &ChangeEvent) {
        let mut dead = Vec::new();
        for entry in self.inner.subscribers.iter() {
            match entry.value().try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber = %entry.key(),
                        "Subscriber queue full, dropping it as unresponsive"
                    );
                    dead.push(*entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*entry.key());
                }
            }
        }
        // Removal happens after iteration; removing a shard entry while
        // iterating the same shard would deadlock.
        for id in dead {
            self.inner.subscribers.remove(&id);
        }
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn unsubscribe(&self, id: Uuid) {
        if self.inner.subscribers.remove(&id).is_some() {
            tracing::debug!(
                subscriber = %id,
                total = self.inner.subscribers.len(),
                "Subscriber removed"
            );
        }
    }
}

/// One subscriber's receiving end, tied to the bus for cleanup.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<ChangeEvent>,
    bus: ChangeBus,
}

impl Subscription {
    /// Subscriber identifier, used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receive the next event in publish order.
    ///
    /// Returns `None` once the bus has pruned this subscriber (its sender is
    /// gone), which ends the owning stream's loop.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}
