//! Tender record types - parsed fields and the final extracted record.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::identifier::TenderIdentifier;
use crate::types::request::Strategy;

/// Classification of an attached document, inferred from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Pdf,
    Document,
    Spreadsheet,
    Archive,
    TechnicalDocument,
}

impl DocumentType {
    /// Infer the type from a filename or URL path.
    pub fn infer(name: &str) -> Self {
        let lower = name.to_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or("");
        let segment = path.rsplit('/').next().unwrap_or("");
        let ext = segment.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

        match ext {
            "pdf" => DocumentType::Pdf,
            "doc" | "docx" | "odt" | "rtf" => DocumentType::Document,
            "xls" | "xlsx" | "ods" | "csv" => DocumentType::Spreadsheet,
            "zip" | "rar" | "7z" => DocumentType::Archive,
            _ => DocumentType::TechnicalDocument,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Document => "document",
            DocumentType::Spreadsheet => "spreadsheet",
            DocumentType::Archive => "archive",
            DocumentType::TechnicalDocument => "technical_document",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document attached to a tender page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    /// Link text, or the last path segment when the link has no text
    pub filename: String,

    /// Absolute URL of the document
    pub url: String,

    /// Inferred classification
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
}

impl DocumentDescriptor {
    /// Create a descriptor, inferring the type from filename then URL.
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        let filename = filename.into();
        let url = url.into();
        let doc_type = match DocumentType::infer(&filename) {
            DocumentType::TechnicalDocument => DocumentType::infer(&url),
            inferred => inferred,
        };
        Self {
            filename,
            url,
            doc_type,
        }
    }
}

/// Fields the parser can populate; used to express the fallback threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderField {
    Title,
    Entity,
    Offers,
    Documents,
}

/// Raw parser output. Every field is optional; the engine decides whether
/// the set is sufficient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub title: Option<String>,
    pub entity: Option<String>,
    pub offers: Option<u32>,
    #[serde(default)]
    pub documents: Vec<DocumentDescriptor>,
}

impl ParsedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_offers(mut self, offers: u32) -> Self {
        self.offers = Some(offers);
        self
    }

    pub fn with_document(mut self, document: DocumentDescriptor) -> Self {
        self.documents.push(document);
        self
    }

    /// Whether a field carries a usable value.
    pub fn has(&self, field: TenderField) -> bool {
        match field {
            TenderField::Title => self.title.as_deref().is_some_and(|t| !t.trim().is_empty()),
            TenderField::Entity => self.entity.as_deref().is_some_and(|e| !e.trim().is_empty()),
            TenderField::Offers => self.offers.is_some(),
            TenderField::Documents => !self.documents.is_empty(),
        }
    }

    /// Required fields this set lacks, in declaration order.
    pub fn missing<'a>(&self, required: impl IntoIterator<Item = &'a TenderField>) -> Vec<TenderField> {
        required.into_iter().copied().filter(|f| !self.has(*f)).collect()
    }
}

/// A successfully extracted tender record.
///
/// Serializes to the export schema:
/// `id, title, entity, offers, documents[{filename,url,type}], timestamp, url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub id: TenderIdentifier,
    pub title: String,
    pub entity: String,
    pub offers: u32,
    pub documents: Vec<DocumentDescriptor>,
    #[serde(with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub url: String,

    /// Strategy whose page produced this record
    #[serde(skip_serializing, default = "default_strategy")]
    pub strategy: Strategy,
}

fn default_strategy() -> Strategy {
    Strategy::Static
}

impl ExtractedFields {
    /// Assemble a record from parser output.
    pub fn from_parsed(
        id: TenderIdentifier,
        url: impl Into<String>,
        parsed: ParsedFields,
        strategy: Strategy,
    ) -> Self {
        Self {
            id,
            title: parsed.title.unwrap_or_default(),
            entity: parsed.entity.unwrap_or_default(),
            offers: parsed.offers.unwrap_or(0),
            documents: parsed.documents,
            timestamp: Utc::now(),
            url: url.into(),
            strategy,
        }
    }

    /// ISO-8601 timestamp as exported.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_inference() {
        assert_eq!(DocumentType::infer("Bases Técnicas.PDF"), DocumentType::Pdf);
        assert_eq!(DocumentType::infer("anexo.docx"), DocumentType::Document);
        assert_eq!(DocumentType::infer("presupuesto.xlsx"), DocumentType::Spreadsheet);
        assert_eq!(DocumentType::infer("planos.zip"), DocumentType::Archive);
        assert_eq!(
            DocumentType::infer("https://x.cl/Attachment/View?file=a.pdf#top"),
            DocumentType::TechnicalDocument
        );
        assert_eq!(DocumentType::infer("Ver adjunto"), DocumentType::TechnicalDocument);
    }

    #[test]
    fn test_descriptor_falls_back_to_url_extension() {
        let doc = DocumentDescriptor::new("Ver adjunto", "https://x.cl/docs/bases.pdf");
        assert_eq!(doc.doc_type, DocumentType::Pdf);
    }

    #[test]
    fn test_missing_fields() {
        let parsed = ParsedFields::new().with_title("Adquisición").with_entity("  ");
        let missing = parsed.missing(&[TenderField::Title, TenderField::Entity]);
        assert_eq!(missing, vec![TenderField::Entity]);
    }

    #[test]
    fn test_record_schema() {
        let id = TenderIdentifier::parse("1234-567-L123").unwrap();
        let parsed = ParsedFields::new()
            .with_title("Adquisición de Equipos")
            .with_entity("Municipalidad X")
            .with_offers(3)
            .with_document(DocumentDescriptor::new("bases.pdf", "https://x.cl/bases.pdf"));
        let record = ExtractedFields::from_parsed(id, "https://x.cl/t", parsed, Strategy::Static);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], "1234-567-L123");
        assert_eq!(value["entity"], "Municipalidad X");
        assert_eq!(value["offers"], 3);
        assert_eq!(value["documents"][0]["type"], "pdf");
        assert!(value.get("strategy").is_none());
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
