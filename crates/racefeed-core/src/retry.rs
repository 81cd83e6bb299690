//! Exponential backoff with jitter.

use std::time::Duration;

/// Backoff strategy for scheduling the next attempt after a failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between attempts.
    Fixed {
        /// Delay between attempts.
        delay: Duration,
    },
    /// Uses an exponential delay between attempts.
    ///
    /// The delay is `min(base * factor^attempt, max)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent attempt.
        factor: f64,
        /// The maximum duration to wait.
        max: Duration,
        /// Whether to add up to +50% random jitter. Jitter never shortens the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(2),
            factor: 2.0,
            max: Duration::from_secs(300),
            jitter: true,
        }
    }
}

impl Backoff {
    pub const fn exponential(base: Duration, max: Duration) -> Self {
        Self::Exponential {
            base,
            factor: 2.0,
            max,
            jitter: false,
        }
    }

    pub const fn with_jitter(self) -> Self {
        match self {
            Self::Exponential {
                base, factor, max, ..
            } => Self::Exponential {
                base,
                factor,
                max,
                jitter: true,
            },
            fixed => fixed,
        }
    }

    /// Delay before the next attempt, given the number of consecutive failures
    /// that preceded it (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = if seconds.is_finite() {
                    Duration::from_secs_f64(seconds.min(max.as_secs_f64()))
                } else {
                    max
                };

                if jitter {
                    let spread_ms = (capped.as_millis() / 2).min(u128::from(u64::MAX)) as u64;
                    capped + Duration::from_millis(fastrand::u64(0..=spread_ms))
                } else {
                    capped
                }
            }
        }
    }

    /// The jitter-free delay: the earliest the next attempt may happen.
    pub fn floor(self, attempt: u32) -> Duration {
        match self {
            Self::Exponential {
                base, factor, max, ..
            } => Self::Exponential {
                base,
                factor,
                max,
                jitter: false,
            }
            .delay(attempt),
            fixed => fixed.delay(attempt),
        }
    }
}
