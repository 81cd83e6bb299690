//! Per-source request spacing and failure backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::retry::Backoff;
use crate::source_policy::SourcePolicy;
use crate::SourceId;

const DEFAULT_SPACING: Duration = Duration::from_secs(2);

/// Grant returned by [`RateLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    pub source: SourceId,
    /// Consecutive failures recorded before this request; 0 after a success.
    pub attempt: u32,
}

#[derive(Debug, Default)]
struct BackoffState {
    attempt: u32,
    retry_not_before: Option<Instant>,
}

#[derive(Debug)]
struct SourceGate {
    min_spacing: Duration,
    backoff: Backoff,
    /// Time of the last granted request. Held across the wait so that only one
    /// caller at a time can claim the next slot.
    turnstile: tokio::sync::Mutex<Option<Instant>>,
    state: Mutex<BackoffState>,
}

impl SourceGate {
    fn new(min_spacing: Duration, backoff: Backoff) -> Self {
        Self {
            min_spacing,
            backoff,
            turnstile: tokio::sync::Mutex::new(None),
            state: Mutex::new(BackoffState::default()),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BackoffState> {
        self.state
            .lock()
            .expect("rate limiter backoff lock should not be poisoned")
    }
}

/// Enforces a minimum inter-request spacing per source and tracks
/// exponential backoff after failures.
#[derive(Debug, Default)]
pub struct RateLimiter {
    gates: Mutex<HashMap<SourceId, Arc<SourceGate>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_policies<'a>(policies: impl IntoIterator<Item = &'a SourcePolicy>) -> Self {
        let limiter = Self::new();
        for policy in policies {
            limiter.register(policy.source_id, policy.min_spacing, policy.backoff);
        }
        limiter
    }

    /// Declares spacing and backoff for a source, resetting its state.
    pub fn register(&self, source: SourceId, min_spacing: Duration, backoff: Backoff) {
        self.lock_gates()
            .insert(source, Arc::new(SourceGate::new(min_spacing, backoff)));
    }

    /// Waits until `source` may be called again, then claims the slot.
    ///
    /// The slot is recorded before the caller is released, so two concurrent
    /// callers never share a spacing window. A pending backoff also delays
    /// the grant.
    pub async fn acquire(&self, source: SourceId) -> Permit {
        let gate = self.gate(source);
        let mut last_request = gate.turnstile.lock().await;

        let spacing_ready = last_request.map(|last| last + gate.min_spacing);
        let backoff_ready = gate.lock_state().retry_not_before;
        let ready_at = match (spacing_ready, backoff_ready) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        if let Some(ready_at) = ready_at {
            if ready_at > Instant::now() {
                debug!(source = %source, wait_ms = (ready_at - Instant::now()).as_millis() as u64, "rate limiter holding request");
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *last_request = Some(Instant::now());
        let attempt = gate.lock_state().attempt;
        Permit { source, attempt }
    }

    /// Clears the failure streak of `source`.
    pub fn record_success(&self, source: SourceId) {
        let gate = self.gate(source);
        let mut state = gate.lock_state();
        state.attempt = 0;
        state.retry_not_before = None;
    }

    /// Schedules the next attempt no sooner than `min(base * 2^attempt, max)`
    /// and returns that delay.
    pub fn record_failure(&self, source: SourceId) -> Duration {
        let gate = self.gate(source);
        let mut state = gate.lock_state();
        let delay = gate.backoff.delay(state.attempt);
        state.retry_not_before = Some(Instant::now() + delay);
        state.attempt = state.attempt.saturating_add(1);
        debug!(source = %source, attempt = state.attempt, delay_ms = delay.as_millis() as u64, "source backing off");
        delay
    }

    /// Remaining backoff for `source`, if it is still backing off.
    pub fn retry_after(&self, source: SourceId) -> Option<Duration> {
        let gate = self.gate(source);
        let state = gate.lock_state();
        state
            .retry_not_before
            .and_then(|at| at.checked_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero())
    }

    pub fn attempt(&self, source: SourceId) -> u32 {
        self.gate(source).lock_state().attempt
    }

    fn gate(&self, source: SourceId) -> Arc<SourceGate> {
        self.lock_gates()
            .entry(source)
            .or_insert_with(|| Arc::new(SourceGate::new(DEFAULT_SPACING, Backoff::default())))
            .clone()
    }

    fn lock_gates(&self) -> std::sync::MutexGuard<'_, HashMap<SourceId, Arc<SourceGate>>> {
        self.gates
            .lock()
            .expect("rate limiter registry lock should not be poisoned")
    }
}
