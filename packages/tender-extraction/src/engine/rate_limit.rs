//! Global dispatch gate.
//!
//! Spaces the start of successive dispatches using the governor crate.
//! One gate is shared by every worker, so the pace is the same whatever
//! the concurrency.

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::time::Duration;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// GCRA gate with burst 1: at most one dispatch per `interval`.
pub struct DispatchGate {
    limiter: Option<DirectRateLimiter>,
    interval: Duration,
}

impl DispatchGate {
    /// Create a gate. A zero interval never waits.
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(nonzero!(1u32))));
        Self { limiter, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next dispatch slot.
    ///
    /// Cancel-safe: dropping the future does not consume a slot.
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for DispatchGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchGate")
            .field("interval", &self.interval)
            .finish()
    }
}
