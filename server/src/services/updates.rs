//! In-process pub-sub for "ingest tick completed" notifications.
//!
//! DESIGN
//! ======
//! One producer (the ingester), many subscribers (WebSocket sessions).
//! Each subscriber gets a capacity-1 channel; `publish` uses `try_send`
//! and drops the notification when a subscriber's buffer is already full.
//! Consecutive ticks therefore coalesce into one pending wake-up and the
//! publisher never blocks on a slow session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

#[derive(Clone, Default)]
pub struct UpdateBus {
    subscribers: Arc<Mutex<HashMap<u64, mpsc::Sender<()>>>>,
    next_id: Arc<AtomicU64>,
}

/// A live subscription. Dropping it removes the subscriber from the bus.
pub struct UpdateSubscription {
    id: u64,
    rx: mpsc::Receiver<()>,
    subscribers: Arc<Mutex<HashMap<u64, mpsc::Sender<()>>>>,
}

impl UpdateBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and return its receive handle.
    #[must_use]
    pub fn subscribe(&self) -> UpdateSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(1);
        self.subscribers
            .lock()
            .expect("update bus lock poisoned")
            .insert(id, tx);
        UpdateSubscription { id, rx, subscribers: Arc::clone(&self.subscribers) }
    }

    /// Notify every subscriber without blocking. Full buffers are skipped:
    /// the subscriber already has a wake-up pending.
    pub fn publish(&self) {
        let subscribers = self.subscribers.lock().expect("update bus lock poisoned");
        for tx in subscribers.values() {
            let _ = tx.try_send(());
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("update bus lock poisoned").len()
    }
}

impl UpdateSubscription {
    /// Wait for the next notification. Returns `None` if the bus is gone.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

impl Drop for UpdateSubscription {
    fn drop(&mut self) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let bus = UpdateBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish();
        assert_eq!(a.recv().await, Some(()));
        assert_eq!(b.recv().await, Some(()));
    }

    #[tokio::test]
    async fn consecutive_publishes_coalesce_for_slow_subscribers() {
        let bus = UpdateBus::new();
        let mut sub = bus.subscribe();

        for _ in 0..5 {
            bus.publish();
        }

        // Only the single buffered notification is delivered.
        assert_eq!(sub.recv().await, Some(()));
        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let bus = UpdateBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);

        // Publishing to an empty bus is a no-op.
        bus.publish();
    }

    #[tokio::test]
    async fn publish_never_blocks_on_full_buffers() {
        let bus = UpdateBus::new();
        let _sub = bus.subscribe();

        // Would deadlock here if publish awaited channel capacity.
        for _ in 0..100 {
            bus.publish();
        }
    }
}
