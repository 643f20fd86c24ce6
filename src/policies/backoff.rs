//! # Relaunch delay policy.
//!
//! [`BackoffPolicy`] computes how long the monitor loop waits between an exit
//! and the next launch of the same process. The delay for the `n`-th
//! consecutive restart (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jittered.
//!
//! The default has `factor = 1.0`, which yields the fixed relaunch delay
//! (5s) of an always-restart supervisor. Raising `factor` turns the same
//! policy into exponential backoff for flapping processes.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use fleetvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(8),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(1));
//! assert_eq!(backoff.next(2), Duration::from_secs(4));
//! assert_eq!(backoff.next(10), Duration::from_secs(8));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::jitter::JitterPolicy;

/// Relaunch backoff policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first relaunch.
    #[serde(with = "humantime_serde")]
    pub first: Duration,
    /// Upper bound for any delay.
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    /// Multiplicative growth per consecutive restart (`1.0` = fixed delay).
    pub factor: f64,
    /// Randomization applied after clamping.
    #[serde(default)]
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Fixed 5s delay: `first = 5s`, `factor = 1.0`, `max = 5m`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(5),
            max: Duration::from_secs(300),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Fixed delay without growth or jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay before restart number `streak` (0-indexed).
    ///
    /// Non-finite or negative intermediate values clamp to `max`, so any
    /// `streak` is safe to pass.
    pub fn next(&self, streak: u32) -> Duration {
        let exp = streak.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };

        self.jitter.apply(base)
    }
}
