//! Runtime events: types and broadcast bus.
//!
//! Every lifecycle transition in the supervisor is published as an [`Event`]
//! on the [`Bus`]: process launches and exits, scheduled restarts, bootstrap
//! progress, log rotations and the shutdown sequence.
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor`, `ProcessActor`, `runner::run_once`,
//!   `BootstrapCoordinator`, `RotationWorker`, `SubscriberSet` workers.
//! - **Consumers**: `Supervisor::subscriber_listener()` (fans out to the
//!   `SubscriberSet` and updates the `AliveTracker`) and the
//!   `BootstrapCoordinator` quorum barrier (its own receiver).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
