//! Result sinks: JSON and CSV export of a finished report.

mod csv;
mod json;

pub use self::csv::{CsvSink, FailureCsvSink};
pub use self::json::JsonSink;

pub use crate::traits::sink::ResultSink;

#[cfg(test)]
pub(crate) fn test_report() -> crate::types::outcome::ExtractionReport {
    use crate::error::ErrorKind;
    use crate::types::identifier::TenderIdentifier;
    use crate::types::outcome::{ExtractionFailure, ExtractionOutcome, ExtractionReport};
    use crate::types::request::Strategy;
    use crate::types::tender::{DocumentDescriptor, ExtractedFields, ParsedFields};

    let parsed = ParsedFields::new()
        .with_title("Adquisición de señalética")
        .with_entity("Municipalidad de Arica")
        .with_offers(4)
        .with_document(DocumentDescriptor::new(
            "bases.pdf",
            "https://www.mercadopublico.cl/Attachment/bases.pdf",
        ));

    let id = TenderIdentifier::parse("1234-567-L123").unwrap();
    let success = ExtractedFields::from_parsed(
        id,
        "https://www.mercadopublico.cl/Procurement/Modules/RFB/DetailsAcquisition.aspx?idlicitacion=1234-567-L123",
        parsed,
        Strategy::Static,
    );

    ExtractionReport {
        outcomes: vec![
            ExtractionOutcome::Success(success),
            ExtractionOutcome::Failure(ExtractionFailure::new(
                "9999-1-L1",
                ErrorKind::Permanent,
                1,
                "HTTP 404",
            )),
        ],
        cancelled: false,
    }
}
