use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
///
/// Called from a dedicated worker task. Implementations may be slow (I/O,
/// batching) without affecting the publishers or other subscribers; if the
/// queue overflows, events for this subscriber are dropped.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
