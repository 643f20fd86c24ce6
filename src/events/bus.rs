//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that monitor loops, the
//! bootstrap coordinator and the rotation worker can publish without ever
//! blocking on slow consumers.
//!
//! ```text
//! Publishers (many):                    Receivers:
//!   ProcessActor  ──┐
//!   RotationWorker──┼──► Bus ──┬──► subscriber_listener ──► SubscriberSet
//!   Bootstrap     ──┤          └──► BootstrapCoordinator (quorum barrier)
//!   Supervisor    ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks.
//! - A single ring buffer of `capacity` events is shared by all receivers.
//! - Receivers that fall behind observe `RecvError::Lagged(n)`.
//! - Events published while nobody is subscribed are dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_receiver_sees_events_after_subscribe() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::ShutdownRequested));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ProcessStarting).with_process("storage#0"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ProcessStarting);
        assert_eq!(ev.process.as_deref(), Some("storage#0"));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ShutdownRequested));
    }
}
