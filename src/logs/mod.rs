//! # Log capture and rotation.
//!
//! Every managed process writes into its own [`LogSink`]. The sink owns the
//! file handle and its size counter behind one lock, so the stdout and
//! stderr pumps of a process never interleave inside a write, and rotation
//! never races with a write.
//!
//! ```text
//! stdout pump ─┐
//!              ├─► LogSink::write ─► size ≥ rollover? ─► rotate ─► prune (retention)
//! stderr pump ─┘         ▲
//!                        │ periodic enforce()
//!                 RotationWorker (one for the fleet)
//! ```
//!
//! Rotated files are named `<stem>.log.<generation>`; a higher generation
//! is newer. Retention counts rotated files only, never the live file.

mod rotation;
mod sink;

pub use rotation::{RotationPolicy, RotationWorker};
pub use sink::LogSink;
