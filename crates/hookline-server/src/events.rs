//! In-process publish/subscribe feeding SSE subscribers.
//!
//! Keyed by endpoint slug. Each subscriber owns a bounded channel;
//! publishing is a non-blocking fan-out under the read lock, so a slow
//! subscriber only ever loses its own events. Subscribers unregister
//! themselves on drop, which ties their lifetime to the SSE connection.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Bounded per-subscriber queue depth.
pub const SUBSCRIBER_QUEUE: usize = 10;

/// Event published once a capture has been persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureEvent {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub method: String,
    pub path: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<HashMap<String, HashMap<u64, mpsc::Sender<CaptureEvent>>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber for an endpoint slug.
    pub fn subscribe(&self, slug: &str) -> Subscriber {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.entry(slug.to_string()).or_default().insert(id, tx);

        Subscriber {
            bus: Arc::clone(&self.inner),
            slug: slug.to_string(),
            id,
            rx,
        }
    }

    /// Non-blocking fan-out to every subscriber of the slug. A subscriber
    /// whose queue is full misses this event; the capture is unaffected.
    pub fn publish(&self, slug: &str, event: &CaptureEvent) {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(channels) = subscribers.get(slug) {
            for tx in channels.values() {
                let _ = tx.try_send(event.clone());
            }
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, slug: &str) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slug)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

/// A live subscription; dropping it removes the subscriber from the bus.
pub struct Subscriber {
    bus: Arc<BusInner>,
    slug: String,
    id: u64,
    rx: mpsc::Receiver<CaptureEvent>,
}

impl Subscriber {
    pub async fn recv(&mut self) -> Option<CaptureEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<CaptureEvent> {
        self.rx.try_recv().ok()
    }
}

impl futures::Stream for Subscriber {
    type Item = CaptureEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        let mut subscribers = self
            .bus
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(channels) = subscribers.get_mut(&self.slug) {
            channels.remove(&self.id);
            if channels.is_empty() {
                subscribers.remove(&self.slug);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(method: &str) -> CaptureEvent {
        CaptureEvent {
            id: Uuid::new_v4(),
            endpoint_id: Uuid::new_v4(),
            method: method.to_string(),
            path: None,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("fh_events01");

        bus.publish("fh_events01", &event("POST"));

        let received = sub.recv().await.expect("event");
        assert_eq!(received.method, "POST");
    }

    #[tokio::test]
    async fn test_events_are_scoped_to_the_slug() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("fh_events02");

        bus.publish("fh_other000", &event("POST"));

        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_full_queue_drops_events_without_blocking() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("fh_events03");

        // One more than the queue holds; the publisher must not block.
        for _ in 0..SUBSCRIBER_QUEUE + 1 {
            bus.publish("fh_events03", &event("POST"));
        }

        let mut delivered = 0;
        while sub.try_recv().is_some() {
            delivered += 1;
        }
        assert_eq!(delivered, SUBSCRIBER_QUEUE);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe("fh_events04");
        assert_eq!(bus.subscriber_count("fh_events04"), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count("fh_events04"), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_affect_others() {
        let bus = EventBus::new();
        let mut slow = bus.subscribe("fh_events05");
        let mut live = bus.subscribe("fh_events05");

        for _ in 0..SUBSCRIBER_QUEUE + 5 {
            bus.publish("fh_events05", &event("POST"));
            // The live subscriber keeps draining; the slow one never does.
            let _ = live.try_recv();
        }

        let mut backlog = 0;
        while slow.try_recv().is_some() {
            backlog += 1;
        }
        assert_eq!(backlog, SUBSCRIBER_QUEUE);
    }
}
