//! Restart and backoff policies.
//!
//! These knobs decide **whether** a managed process is relaunched after it
//! exits and **how long** the monitor loop waits before relaunching it.
//!
//! ## Contents
//! - [`RestartPolicy`] when to relaunch (never / on-failure / always)
//! - [`BackoffPolicy`] how relaunch delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization so sibling processes do not restart in lockstep
//!
//! ## Quick wiring
//! ```text
//! Config { restart, backoff }
//!      └─► core::actor::ProcessActor uses:
//!           - restart.should_restart(outcome) to decide relaunch/exit
//!           - backoff.next(streak) to schedule the relaunch
//! ```
//!
//! ## Defaults
//! - `RestartPolicy::Always`: every exit is followed by a relaunch.
//! - `BackoffPolicy::default()`: first=5s, factor=1.0 (fixed delay), max=5m, jitter=None.

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
