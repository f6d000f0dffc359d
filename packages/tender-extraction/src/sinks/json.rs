use serde::Serialize;
use std::io::Write;

use crate::error::SinkResult;
use crate::traits::sink::ResultSink;
use crate::types::outcome::{ExtractionFailure, ExtractionReport};
use crate::types::tender::ExtractedFields;

/// Pretty-printed JSON export.
///
/// By default the output is a bare array of success records. With
/// [`with_failures`](JsonSink::with_failures) it becomes an object holding
/// `results`, `failures` and the `cancelled` marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSink {
    include_failures: bool,
}

#[derive(Serialize)]
struct FullReport<'a> {
    results: Vec<&'a ExtractedFields>,
    failures: Vec<&'a ExtractionFailure>,
    cancelled: bool,
}

impl JsonSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures(mut self) -> Self {
        self.include_failures = true;
        self
    }
}

impl ResultSink for JsonSink {
    fn write(&self, report: &ExtractionReport, writer: &mut dyn Write) -> SinkResult<()> {
        let results: Vec<&ExtractedFields> = report.successes().collect();

        if self.include_failures {
            let full = FullReport {
                results,
                failures: report.failures().collect(),
                cancelled: report.cancelled,
            };
            serde_json::to_writer_pretty(&mut *writer, &full)?;
        } else {
            serde_json::to_writer_pretty(&mut *writer, &results)?;
        }
        writeln!(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sinks::test_report;

    #[test]
    fn test_array_of_successes() {
        let mut out = Vec::new();
        JsonSink::new().write(&test_report(), &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], "1234-567-L123");
        assert_eq!(records[0]["offers"], 4);
        assert_eq!(records[0]["documents"][0]["type"], "pdf");
        assert!(records[0].get("strategy").is_none());
    }

    #[test]
    fn test_keeps_non_ascii() {
        let mut out = Vec::new();
        JsonSink::new().write(&test_report(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Adquisición de señalética"));
    }

    #[test]
    fn test_with_failures() {
        let mut out = Vec::new();
        JsonSink::new()
            .with_failures()
            .write(&test_report(), &mut out)
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["results"].as_array().unwrap().len(), 1);
        assert_eq!(value["failures"][0]["kind"], ErrorKind::Permanent.as_str());
        assert_eq!(value["cancelled"], false);
    }
}
