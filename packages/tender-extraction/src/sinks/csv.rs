use std::io::Write;

use crate::error::SinkResult;
use crate::traits::sink::ResultSink;
use crate::types::outcome::ExtractionReport;

/// One row per successful extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSink;

impl CsvSink {
    pub fn new() -> Self {
        Self
    }
}

impl ResultSink for CsvSink {
    fn write(&self, report: &ExtractionReport, writer: &mut dyn Write) -> SinkResult<()> {
        let mut writer = ::csv::Writer::from_writer(writer);
        writer.write_record([
            "id",
            "title",
            "entity",
            "offers",
            "document_count",
            "timestamp",
            "url",
        ])?;

        for fields in report.successes() {
            writer.write_record([
                fields.id.as_str(),
                fields.title.as_str(),
                fields.entity.as_str(),
                fields.offers.to_string().as_str(),
                fields.documents.len().to_string().as_str(),
                fields.timestamp_string().as_str(),
                fields.url.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// One row per failed identifier, for follow-up runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureCsvSink;

impl FailureCsvSink {
    pub fn new() -> Self {
        Self
    }
}

impl ResultSink for FailureCsvSink {
    fn write(&self, report: &ExtractionReport, writer: &mut dyn Write) -> SinkResult<()> {
        let mut writer = ::csv::Writer::from_writer(writer);
        writer.write_record(["id", "kind", "attempts", "message"])?;

        for failure in report.failures() {
            writer.write_record([
                failure.identifier.as_str(),
                failure.kind.as_str(),
                failure.attempts.to_string().as_str(),
                failure.message.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}
