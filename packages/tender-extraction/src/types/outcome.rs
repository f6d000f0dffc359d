//! Terminal outcomes and the materialized run report.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::types::tender::ExtractedFields;

/// Classified failure for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    /// Identifier exactly as supplied by the caller
    pub identifier: String,

    /// Last observed classification
    pub kind: ErrorKind,

    /// Attempts made across both strategies (0 if never dispatched)
    pub attempts: u32,

    /// Human-readable detail of the last error
    pub message: String,
}

impl ExtractionFailure {
    pub fn new(
        identifier: impl Into<String>,
        kind: ErrorKind,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            attempts,
            message: message.into(),
        }
    }
}

/// Terminal result for one input position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Success(ExtractedFields),
    Failure(ExtractionFailure),
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success(_))
    }

    /// Identifier this outcome belongs to.
    pub fn identifier(&self) -> &str {
        match self {
            ExtractionOutcome::Success(fields) => fields.id.as_str(),
            ExtractionOutcome::Failure(failure) => &failure.identifier,
        }
    }

    pub fn as_success(&self) -> Option<&ExtractedFields> {
        match self {
            ExtractionOutcome::Success(fields) => Some(fields),
            ExtractionOutcome::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&ExtractionFailure> {
        match self {
            ExtractionOutcome::Success(_) => None,
            ExtractionOutcome::Failure(failure) => Some(failure),
        }
    }

    /// Failure kind, or `None` for a success.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.as_failure().map(|f| f.kind)
    }
}

/// Result of an `extract_many` run.
///
/// `outcomes[i]` is the outcome for input position `i`; the vector always
/// has exactly as many entries as the input had.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub outcomes: Vec<ExtractionOutcome>,

    /// Set when the run was cancelled before every position finished
    pub cancelled: bool,
}

impl ExtractionReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &ExtractedFields> {
        self.outcomes.iter().filter_map(ExtractionOutcome::as_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExtractionFailure> {
        self.outcomes.iter().filter_map(ExtractionOutcome::as_failure)
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Group outcomes by identifier, preserving first-seen order.
    ///
    /// Duplicated inputs map to several outcomes.
    pub fn by_identifier(&self) -> IndexMap<&str, Vec<&ExtractionOutcome>> {
        let mut map: IndexMap<&str, Vec<&ExtractionOutcome>> = IndexMap::new();
        for outcome in &self.outcomes {
            map.entry(outcome.identifier()).or_default().push(outcome);
        }
        map
    }

    /// Successful records grouped by buying entity, preserving first-seen order.
    pub fn by_entity(&self) -> IndexMap<&str, Vec<&ExtractedFields>> {
        let mut map: IndexMap<&str, Vec<&ExtractedFields>> = IndexMap::new();
        for tender in self.successes() {
            map.entry(tender.entity.as_str()).or_default().push(tender);
        }
        map
    }

    /// Failure counts per kind, in first-seen order.
    pub fn failure_summary(&self) -> IndexMap<ErrorKind, usize> {
        let mut summary = IndexMap::new();
        for failure in self.failures() {
            *summary.entry(failure.kind).or_insert(0) += 1;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        identifier::TenderIdentifier,
        request::Strategy,
        tender::ParsedFields,
    };

    fn failure(id: &str, kind: ErrorKind) -> ExtractionOutcome {
        ExtractionOutcome::Failure(ExtractionFailure::new(id, kind, 1, "boom"))
    }

    #[test]
    fn test_by_identifier_keeps_duplicates() {
        let report = ExtractionReport {
            outcomes: vec![
                failure("1-1-L1", ErrorKind::Transient),
                failure("2-2-L2", ErrorKind::Permanent),
                failure("1-1-L1", ErrorKind::Transient),
            ],
            cancelled: false,
        };

        let grouped = report.by_identifier();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["1-1-L1"].len(), 2);
        assert_eq!(grouped.keys().next(), Some(&"1-1-L1"));
    }

    fn success(id: &str, entity: &str) -> ExtractionOutcome {
        ExtractionOutcome::Success(ExtractedFields::from_parsed(
            TenderIdentifier::parse(id).unwrap(),
            format!("https://portal/{id}"),
            ParsedFields::new().with_title("Licitación").with_entity(entity),
            Strategy::Static,
        ))
    }

    #[test]
    fn test_by_entity_groups_successes() {
        let report = ExtractionReport {
            outcomes: vec![
                success("1-1-L1", "Hospital Regional"),
                success("2-2-L2", "Municipalidad de Arica"),
                failure("3-3-L3", ErrorKind::Permanent),
                success("4-4-L4", "Hospital Regional"),
            ],
            cancelled: false,
        };

        let grouped = report.by_entity();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.keys().next(), Some(&"Hospital Regional"));
        let ids: Vec<&str> = grouped["Hospital Regional"].iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1-1-L1", "4-4-L4"]);
    }

    #[test]
    fn test_failure_summary() {
        let report = ExtractionReport {
            outcomes: vec![
                failure("1-1-L1", ErrorKind::Transient),
                failure("2-2-L2", ErrorKind::Permanent),
                failure("3-3-L3", ErrorKind::Transient),
            ],
            cancelled: true,
        };

        let summary = report.failure_summary();
        assert_eq!(summary[&ErrorKind::Transient], 2);
        assert_eq!(summary[&ErrorKind::Permanent], 1);
        assert_eq!(report.success_count(), 0);
    }
}
