//! Retry and fallback policy.
//!
//! Each identifier moves through a small state machine:
//!
//! ```text
//! Attempting(strategy, n) ──ok──────────────────────────▶ Succeeded
//!        │
//!        ├─ Transient, n ≤ max_retries ──▶ Retry(backoff(n)) ─▶ Attempting(strategy, n+1)
//!        ├─ Transient (exhausted) │ ParseInsufficient ──▶ FallBack ─▶ Attempting(next, 1)
//!        └─ Permanent │ Cancelled │ no next strategy ──────▶ Failed(kind)
//! ```
//!
//! [`RetryPolicy::next`] is the only transition function; the engine just
//! executes what it returns.

use std::time::Duration;

use crate::error::ErrorKind;
use crate::types::config::EngineConfig;
use crate::types::request::Strategy;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Try the same strategy again after `delay`
    Retry { delay: Duration },
    /// Switch to `to` with a fresh retry budget
    FallBack { to: Strategy },
    /// Record a terminal failure
    Fail(ErrorKind),
}

/// Retry budget, backoff curve and fallback switch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries per strategy after a transient failure
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap for any single delay
    pub max_delay: Duration,
    /// Whether a static shortfall may fall back to rendering
    pub render_fallback: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.backoff_base(),
            max_delay: config.max_backoff(),
            render_fallback: config.render_fallback,
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based):
    /// `base × 2^(attempt−1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Transition after attempt `attempt` of `strategy` failed with `kind`.
    pub fn next(&self, strategy: Strategy, attempt: u32, kind: ErrorKind) -> Transition {
        match kind {
            ErrorKind::Transient if attempt <= self.max_retries => Transition::Retry {
                delay: self.backoff(attempt),
            },
            ErrorKind::Transient | ErrorKind::ParseInsufficient => {
                match strategy.fallback().filter(|_| self.render_fallback) {
                    Some(to) => Transition::FallBack { to },
                    None => Transition::Fail(kind),
                }
            }
            ErrorKind::Permanent | ErrorKind::InvalidIdentifier | ErrorKind::Cancelled => {
                Transition::Fail(kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            render_fallback: true,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(300));
        assert_eq!(p.backoff(40), Duration::from_millis(300));
    }

    #[test]
    fn test_transient_retries_then_falls_back() {
        let p = policy();
        assert!(matches!(
            p.next(Strategy::Static, 1, ErrorKind::Transient),
            Transition::Retry { .. }
        ));
        assert!(matches!(
            p.next(Strategy::Static, 2, ErrorKind::Transient),
            Transition::Retry { .. }
        ));
        assert_eq!(
            p.next(Strategy::Static, 3, ErrorKind::Transient),
            Transition::FallBack {
                to: Strategy::Rendered
            }
        );
        assert_eq!(
            p.next(Strategy::Rendered, 3, ErrorKind::Transient),
            Transition::Fail(ErrorKind::Transient)
        );
    }

    #[test]
    fn test_insufficient_falls_back_without_retry() {
        let p = policy();
        assert_eq!(
            p.next(Strategy::Static, 1, ErrorKind::ParseInsufficient),
            Transition::FallBack {
                to: Strategy::Rendered
            }
        );
        assert_eq!(
            p.next(Strategy::Rendered, 1, ErrorKind::ParseInsufficient),
            Transition::Fail(ErrorKind::ParseInsufficient)
        );
    }

    #[test]
    fn test_permanent_stops_immediately() {
        let p = policy();
        for strategy in [Strategy::Static, Strategy::Rendered] {
            assert_eq!(
                p.next(strategy, 1, ErrorKind::Permanent),
                Transition::Fail(ErrorKind::Permanent)
            );
        }
        assert_eq!(
            p.next(Strategy::Static, 1, ErrorKind::Cancelled),
            Transition::Fail(ErrorKind::Cancelled)
        );
    }

    #[test]
    fn test_fallback_disabled() {
        let p = RetryPolicy {
            render_fallback: false,
            ..policy()
        };
        assert_eq!(
            p.next(Strategy::Static, 1, ErrorKind::ParseInsufficient),
            Transition::Fail(ErrorKind::ParseInsufficient)
        );
    }

    #[test]
    fn test_zero_retries() {
        let p = RetryPolicy {
            max_retries: 0,
            ..policy()
        };
        assert_eq!(
            p.next(Strategy::Static, 1, ErrorKind::Transient),
            Transition::FallBack {
                to: Strategy::Rendered
            }
        );
    }
}
