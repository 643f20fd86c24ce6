//! # First-time cluster bootstrap.
//!
//! ```text
//! prepare_layout()                         (before any launch)
//!   ├─► data_dir / log_dir (0700)
//!   └─► cluster file absent? ─► create it ─► create marker
//!
//! BootstrapCoordinator::run()              (one-shot task)
//!   ├─► marker absent? ─► BootstrapSkipped, done
//!   └─► loop attempt = 1..=max_attempts
//!         ├─► wait until quorum of server processes is running (≤ quorum_timeout)
//!         ├─► run init command with {target} (≤ timeout)
//!         ├─► success ─► consume marker ─► BootstrapSucceeded, done
//!         └─► failure ─► BootstrapFailed, marker kept, sleep(retry.next(attempt))
//!       budget spent ─► BootstrapAbandoned (marker kept for next start)
//! ```

mod coordinator;
mod layout;
mod marker;

pub use coordinator::{BootstrapCoordinator, BootstrapOutcome};
pub use layout::{Layout, LayoutError, cluster_descriptor, prepare_layout};
pub use marker::ClusterBootstrapMarker;
