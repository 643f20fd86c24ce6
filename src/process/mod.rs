//! # Managed processes: specification, launch and runtime handle.
//!
//! - [`ProcessSpec`]: immutable description of one process instance
//! - [`ProcessClass`]: role tag (storage / transaction / stateless / backup)
//! - [`Launcher`]: prepares directories, spawns the child, pipes its output into a [`LogSink`](crate::logs::LogSink)
//! - [`ProcessHandle`]: the live child, owned by exactly one monitor loop
//! - [`ExitOutcome`] / [`StopOutcome`]: how a child ended on its own or on shutdown
//! - [`build_table`]: expands configured process groups into specs

mod handle;
mod launcher;
mod spec;
mod table;

pub use handle::{ExitOutcome, ProcessHandle, StopOutcome};
pub use launcher::{Launcher, ensure_private_dir};
pub use spec::{ProcessClass, ProcessSpec, ProcessSpecBuilder};
pub use table::{LOCALITY_ENV_PREFIX, build_table};
pub(crate) use table::render;
