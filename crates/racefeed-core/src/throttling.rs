use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::source_policy::QuotaPolicy;

/// Local bookkeeping of an upstream's documented request quota.
///
/// Spending past the quota is refused up front so the upstream never has to
/// answer `429`; the refusal carries the wait until the next request fits.
#[derive(Clone)]
pub struct QuotaBudget {
    limiter: Arc<DirectRateLimiter>,
    clock: RuntimeClock,
}

type DirectRateLimiter =
    RateLimiter<NotKeyed, InMemoryState, RuntimeClock, NoOpMiddleware<std::time::Instant>>;

/// Reads the tokio clock, so a paused runtime also pauses quota refill.
#[derive(Debug, Clone, Copy, Default)]
struct RuntimeClock;

impl Clock for RuntimeClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now().into_std()
    }
}

impl QuotaBudget {
    pub fn new(window: Duration, limit: u32) -> Self {
        let clock = RuntimeClock;
        Self {
            limiter: Arc::new(RateLimiter::direct_with_clock(
                quota_from_window(window, limit),
                &clock,
            )),
            clock,
        }
    }

    pub fn from_policy(policy: &QuotaPolicy) -> Self {
        Self::new(policy.window, policy.limit)
    }

    /// Spends one request from the budget, or reports how long until one is available.
    pub fn try_spend(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

impl std::fmt::Debug for QuotaBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaBudget").finish_non_exhaustive()
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let safe_limit = NonZeroU32::new(limit.max(1)).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (window.as_secs_f64() / f64::from(safe_limit.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(safe_limit))
        .allow_burst(safe_limit)
}
