//! Per-identifier request state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::identifier::TenderIdentifier;

/// Extraction strategy. Static is always tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Plain HTTP fetch, parse the served HTML
    Static,
    /// Headless browser render, parse the resulting DOM
    Rendered,
}

impl Strategy {
    /// The strategy to switch to once this one is exhausted.
    pub fn fallback(self) -> Option<Strategy> {
        match self {
            Strategy::Static => Some(Strategy::Rendered),
            Strategy::Rendered => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Static => "static",
            Strategy::Rendered => "rendered",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-flight request for one identifier.
///
/// `attempt` counts attempts within the current strategy and restarts at 1
/// on fallback; `total_attempts` spans both strategies.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub identifier: TenderIdentifier,
    pub url: String,
    pub strategy: Strategy,
    pub attempt: u32,
    pub total_attempts: u32,
}

impl ExtractionRequest {
    pub fn new(identifier: TenderIdentifier, url: impl Into<String>) -> Self {
        Self {
            identifier,
            url: url.into(),
            strategy: Strategy::Static,
            attempt: 0,
            total_attempts: 0,
        }
    }

    /// Record the start of another attempt with the current strategy.
    pub fn begin_attempt(&mut self) {
        self.attempt += 1;
        self.total_attempts += 1;
    }

    /// Move to the next strategy with a fresh retry budget.
    pub fn switch_to(&mut self, strategy: Strategy) {
        self.strategy = strategy;
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_chain() {
        assert_eq!(Strategy::Static.fallback(), Some(Strategy::Rendered));
        assert_eq!(Strategy::Rendered.fallback(), None);
    }

    #[test]
    fn test_attempt_counters() {
        let id = TenderIdentifier::parse("1234-567-L123").unwrap();
        let mut req = ExtractionRequest::new(id, "https://example.com");
        req.begin_attempt();
        req.begin_attempt();
        assert_eq!(req.attempt, 2);

        req.switch_to(Strategy::Rendered);
        req.begin_attempt();
        assert_eq!(req.attempt, 1);
        assert_eq!(req.total_attempts, 3);
        assert_eq!(req.strategy, Strategy::Rendered);
    }
}
