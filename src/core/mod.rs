//! Runtime core: orchestration and lifecycle.
//!
//! The public API from this module is [`Supervisor`] (built with
//! [`SupervisorBuilder`]), the [`AliveTracker`] it maintains, and the
//! [`ShutdownReport`] it returns.
//!
//! Internal modules:
//! - [`runner`]: one launch → wait/terminate cycle with event publishing;
//! - [`actor`]: the monitor/restart loop of a single process;
//! - [`supervisor`]: spawns actors and background workers, drives shutdown;
//! - [`shutdown`]: OS signal listeners;
//! - [`alive`]: running-process view used by the bootstrap quorum.

mod actor;
mod alive;
mod builder;
mod runner;
mod shutdown;
mod supervisor;

pub use actor::{ProcessActor, ProcessActorParams};
pub use alive::AliveTracker;
pub use builder::SupervisorBuilder;
pub use supervisor::{ShutdownReport, Supervisor};
