//! Result sink trait.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::SinkResult;
use crate::types::outcome::ExtractionReport;

/// Serializes a finished report.
///
/// Sinks receive the whole report at once and must not assume any
/// particular completion order; `report.outcomes` is in input order.
pub trait ResultSink {
    /// Write the report to `writer`.
    fn write(&self, report: &ExtractionReport, writer: &mut dyn Write) -> SinkResult<()>;

    /// Write the report to a file, replacing it if present.
    fn write_to_path(&self, report: &ExtractionReport, path: &Path) -> SinkResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(report, &mut writer)?;
        writer.flush()?;
        tracing::info!(path = %path.display(), "Results written");
        Ok(())
    }
}
