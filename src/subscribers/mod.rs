//! # Event subscribers.
//!
//! Subscribers observe the [`Event`](crate::Event) stream published on the
//! [`Bus`](crate::events::Bus). Each one is driven by its own worker with a
//! bounded queue, so a slow subscriber never delays process supervision.
//!
//! ```text
//! ProcessActor ── publish(Event) ──► Bus ──► subscriber_listener
//!                                              ├──► AliveTracker (pid bookkeeping)
//!                                              └──► SubscriberSet::emit
//!                                                     ├──► LogWriter (tracing)
//!                                                     └──► custom subscribers
//! ```
//!
//! ## Implementing a subscriber
//! ```no_run
//! use async_trait::async_trait;
//! use fleetvisor::{Event, EventKind, Subscribe};
//!
//! struct CrashCounter;
//!
//! #[async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::ProcessExited {
//!             // increment a counter
//!         }
//!     }
//!     fn name(&self) -> &'static str { "crash-counter" }
//! }
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
