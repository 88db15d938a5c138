//! Broadcast bridge from [`Runtime`] listeners to async receivers.
//!
//! Non-blocking: the runtime listener never awaits. Slow receivers are
//! dropped (lagged) rather than stalling event emission.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use helm_core::Event;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::lifecycle::{Runtime, Subscription};

/// Default broadcast channel capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Forwards every runtime event onto a `tokio::sync::broadcast` channel.
///
/// The runtime listener is removed when the broadcaster is dropped or
/// [`detach`](EventBroadcaster::detach)ed.
pub struct EventBroadcaster {
    tx: broadcast::Sender<Event>,
    emit_count: Arc<AtomicU64>,
    subscription: Mutex<Option<Subscription>>,
}

impl EventBroadcaster {
    /// Attach to `runtime` with the default channel capacity.
    pub fn attach(runtime: &Runtime) -> Self {
        Self::with_capacity(runtime, DEFAULT_CAPACITY)
    }

    /// Attach to `runtime` with a custom channel capacity (minimum 1).
    pub fn with_capacity(runtime: &Runtime, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let emit_count = Arc::new(AtomicU64::new(0));

        let sender = tx.clone();
        let counter = Arc::clone(&emit_count);
        let subscription = runtime.subscribe(move |event| {
            let _ = counter.fetch_add(1, Ordering::Relaxed);
            let _ = sender.send(event.clone());
        });

        Self {
            tx,
            emit_count,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// Receive all events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total events forwarded so far.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }

    /// Stop forwarding. Safe to call more than once.
    pub fn detach(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }
}

impl Drop for EventBroadcaster {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use helm_core::EventType;

    use super::*;

    #[test]
    fn forwards_without_receivers() {
        let runtime = Runtime::new();
        let broadcaster = EventBroadcaster::attach(&runtime);
        runtime.status("s", "");
        assert_eq!(broadcaster.emit_count(), 1);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn multiple_receivers_see_events_in_order() {
        let runtime = Runtime::new();
        let broadcaster = EventBroadcaster::attach(&runtime);
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        runtime.start_run("run-1").unwrap();
        runtime.end_run().unwrap();

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(rx.recv().await.unwrap().event_type, EventType::AgentStart);
            assert_eq!(rx.recv().await.unwrap().event_type, EventType::AgentEnd);
        }
    }

    #[tokio::test]
    async fn slow_receiver_lags() {
        let runtime = Runtime::new();
        let broadcaster = EventBroadcaster::with_capacity(&runtime, 2);
        let mut rx = broadcaster.subscribe();

        runtime.status("a", "");
        runtime.status("b", "");
        runtime.status("c", "");

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().code.as_deref(), Some("b"));
    }

    #[test]
    fn drop_detaches_listener() {
        let runtime = Runtime::new();
        let broadcaster = EventBroadcaster::with_capacity(&runtime, 0);
        assert_eq!(runtime.listener_count(), 1);
        broadcaster.detach();
        broadcaster.detach();
        assert_eq!(runtime.listener_count(), 0);

        let again = EventBroadcaster::attach(&runtime);
        assert_eq!(runtime.listener_count(), 1);
        drop(again);
        assert_eq!(runtime.listener_count(), 0);
    }
}
