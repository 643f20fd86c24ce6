//! # Restart policies for the monitor loop.
//!
//! [`RestartPolicy`] decides whether a managed process is relaunched after it exits.
//!
//! ```text
//! RestartPolicy::Never      → process runs once, loop ends after the first exit
//! RestartPolicy::OnFailure  → relaunch on non-zero exit, signal death or spawn error
//! RestartPolicy::Always     → relaunch after every exit, including exit code 0 (default)
//! ```
//!
//! A relaunch is never immediate: the monitor loop always waits the delay
//! computed by [`BackoffPolicy`](crate::BackoffPolicy) first.

use serde::{Deserialize, Serialize};

/// Policy controlling whether a process is relaunched after it exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never relaunch: the process runs once.
    Never,
    /// Relaunch only when the process failed.
    OnFailure,
    /// Relaunch unconditionally (default).
    #[default]
    Always,
}

impl RestartPolicy {
    /// Returns `true` if a process whose last run ended with `succeeded`
    /// should be relaunched.
    ///
    /// `succeeded` is `true` only for a clean `exit(0)`; spawn errors and
    /// signal deaths count as failures.
    pub fn should_restart(&self, succeeded: bool) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure => !succeeded,
            RestartPolicy::Always => true,
        }
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RestartPolicy::Never => "never",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::Always => "always",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_restarts_clean_exit() {
        assert!(RestartPolicy::Always.should_restart(true));
        assert!(RestartPolicy::Always.should_restart(false));
    }

    #[test]
    fn test_on_failure_skips_clean_exit() {
        assert!(!RestartPolicy::OnFailure.should_restart(true));
        assert!(RestartPolicy::OnFailure.should_restart(false));
    }

    #[test]
    fn test_never() {
        assert!(!RestartPolicy::Never.should_restart(false));
    }

    #[test]
    fn test_parses_kebab_case() {
        #[derive(Deserialize)]
        struct Wrap {
            restart: RestartPolicy,
        }
        let w: Wrap = toml::from_str(r#"restart = "on-failure""#).unwrap();
        assert_eq!(w.restart, RestartPolicy::OnFailure);
    }
}
