//! # Non-blocking event fan-out.
//!
//! ```text
//! emit(event)
//!     ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     └──► [queue N] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - `emit()` returns immediately (`try_send`).
//! - Per-subscriber FIFO, no ordering across subscribers.
//! - A full or closed queue drops the event for that subscriber only and
//!   publishes `SubscriberOverflow` (never for an overflow event itself).
//! - Panics are caught per event, logged and published as `SubscriberPanicked`.
//! - Overflow and panic reports go to bus receivers only; the supervisor
//!   listener does not hand them back to the set.

use std::sync::{Arc, Mutex, RwLock};

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out over subscribers, one bounded queue and worker each.
pub struct SubscriberSet {
    channels: RwLock<Vec<SubscriberChannel>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates the set and spawns one worker per subscriber.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            let worker_bus = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = if let Some(msg) = panic.downcast_ref::<&'static str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = panic.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        tracing::error!(subscriber = sub.name(), panic = %info, "subscriber panicked");
                        worker_bus.publish(Event::subscriber_panicked(sub.name(), info));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }

        Self {
            channels: RwLock::new(channels),
            workers: Mutex::new(workers),
            bus,
        }
    }

    /// Delivers `event` to every subscriber queue without waiting.
    pub fn emit(&self, event: &Event) {
        let event = Arc::new(event.clone());
        let is_overflow = matches!(event.kind, EventKind::SubscriberOverflow);

        let Ok(channels) = self.channels.read() else {
            return;
        };
        for channel in channels.iter() {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow {
                tracing::warn!(subscriber = channel.name, reason, "subscriber dropped event");
                self.bus
                    .publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }

    /// Closes every queue and waits for workers to drain what they hold.
    pub async fn shutdown(&self) {
        if let Ok(mut channels) = self.channels.write() {
            channels.clear();
        }
        let workers: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut w) => w.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for h in workers {
            let _ = h.await;
        }
    }

    /// Number of subscribers still attached.
    pub fn len(&self) -> usize {
        self.channels.read().map(|c| c.len()).unwrap_or(0)
    }

    /// True if no subscribers are attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscribe for Panicker {
        async fn on_event(&self, _event: &Event) {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "panicker"
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_all_and_shutdown_drains() {
        let hits = Arc::new(AtomicUsize::new(0));
        let bus = Bus::new(16);
        let set = SubscriberSet::new(
            vec![Arc::new(Counter(hits.clone())), Arc::new(Counter(hits.clone()))],
            bus,
        );
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::ProcessStarting));
        set.emit(&Event::new(EventKind::ProcessRunning));
        set.shutdown().await;

        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_panic_is_reported_on_bus() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Panicker)], bus);

        set.emit(&Event::new(EventKind::ProcessStarting));
        let ev = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.reason.as_deref(), Some("boom"));
        set.shutdown().await;
    }
}
