//! # OS signal handling.
//!
//! [`ShutdownSignals`] registers its listeners up front, so a failure to
//! install them is reported before any child has been launched.
//!
//! ## Signals
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/init scripts)
//! - `SIGQUIT` (quit signal, often used for a hard stop)

use tokio::signal::unix::{Signal, SignalKind, signal};

/// Installed termination signal listeners.
pub struct ShutdownSignals {
    sigint: Signal,
    sigterm: Signal,
    sigquit: Signal,
}

impl ShutdownSignals {
    /// Registers listeners for SIGINT, SIGTERM and SIGQUIT.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Completes when any of the signals arrives.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigint.recv()  => tracing::info!("received SIGINT"),
            _ = self.sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = self.sigquit.recv() => tracing::info!("received SIGQUIT"),
        }
    }
}
