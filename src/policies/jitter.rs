//! # Jitter for relaunch delays.
//!
//! When several processes of a fleet crash together (shared disk full, host
//! hiccup) a fixed delay makes them all come back in the same instant.
//! [`JitterPolicy`] spreads those relaunches out.
//!
//! - [`JitterPolicy::None`]  exact delay
//! - [`JitterPolicy::Full`]  random in `[0, delay]`
//! - [`JitterPolicy::Equal`] `delay/2 + random[0, delay/2]`

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Randomization applied to a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JitterPolicy {
    /// Use the delay as computed.
    #[default]
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// Half the delay plus a random share of the other half.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return delay;
        }
        let mut rng = rand::rng();
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + rng.random_range(0..=ms - half))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_identity() {
        let d = Duration::from_millis(1234);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn test_full_bounds() {
        let d = Duration::from_secs(2);
        for _ in 0..100 {
            assert!(JitterPolicy::Full.apply(d) <= d);
        }
    }

    #[test]
    fn test_equal_bounds() {
        let d = Duration::from_secs(2);
        for _ in 0..100 {
            let j = JitterPolicy::Equal.apply(d);
            assert!(j >= Duration::from_secs(1));
            assert!(j <= d);
        }
    }

    #[test]
    fn test_zero_delay_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
    }
}
