//! Attachment downloads.
//!
//! Saves the documents listed on extracted tenders under
//! `<dir>/<tender id>/`. Requests go out one at a time through the same
//! kind of dispatch gate the engine uses, so a download pass keeps the
//! configured pace. Attachments the portal puts behind a CAPTCHA come back
//! as non-success statuses and are reported as failed downloads.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::engine::DispatchGate;
use crate::error::DownloadResult;
use crate::fetchers::HttpFetcher;
use crate::types::{
    config::EngineConfig,
    outcome::ExtractionReport,
    tender::{DocumentDescriptor, ExtractedFields},
};

const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// A document written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedDocument {
    pub tender: String,
    pub url: String,
    pub path: PathBuf,
    pub bytes: usize,
}

/// A document that could not be saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDownload {
    pub tender: String,
    pub url: String,
    pub error: String,
}

/// Result of a download pass. One download failing never stops the rest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadSummary {
    pub saved: Vec<SavedDocument>,
    pub failed: Vec<FailedDownload>,
}

impl DownloadSummary {
    fn merge(&mut self, other: DownloadSummary) {
        self.saved.extend(other.saved);
        self.failed.extend(other.failed);
    }

    pub fn total_bytes(&self) -> usize {
        self.saved.iter().map(|doc| doc.bytes).sum()
    }
}

/// Downloads tender attachments with a shared HTTP client.
///
/// # Example
///
/// ```rust,ignore
/// let downloader = DocumentDownloader::new(HttpFetcher::new()?, "downloads")
///     .with_request_delay(Duration::from_millis(500));
/// let summary = downloader.download_report(&report).await?;
/// println!("saved {} documents", summary.saved.len());
/// ```
pub struct DocumentDownloader {
    fetcher: HttpFetcher,
    dir: PathBuf,
    timeout: Duration,
    gate: DispatchGate,
}

impl DocumentDownloader {
    pub fn new(fetcher: HttpFetcher, dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            dir: dir.into(),
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            gate: DispatchGate::new(Duration::ZERO),
        }
    }

    /// Pace downloads like page dispatches.
    pub fn from_config(fetcher: HttpFetcher, dir: impl Into<PathBuf>, config: &EngineConfig) -> Self {
        Self::new(fetcher, dir).with_request_delay(config.request_delay())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.gate = DispatchGate::new(delay);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download the documents of every successful record in the report.
    pub async fn download_report(&self, report: &ExtractionReport) -> DownloadResult<DownloadSummary> {
        let mut summary = DownloadSummary::default();
        for tender in report.successes() {
            summary.merge(self.download_tender(tender).await?);
        }

        info!(
            dir = %self.dir.display(),
            saved = summary.saved.len(),
            failed = summary.failed.len(),
            bytes = summary.total_bytes(),
            "Document download finished"
        );
        Ok(summary)
    }

    /// Download one tender's documents into its own directory.
    ///
    /// Only failing to create the directory is an error; a document that
    /// cannot be fetched or written is recorded in the summary.
    pub async fn download_tender(&self, tender: &ExtractedFields) -> DownloadResult<DownloadSummary> {
        let mut summary = DownloadSummary::default();
        if tender.documents.is_empty() {
            return Ok(summary);
        }

        let tender_dir = self.dir.join(tender_dir_name(tender.id.as_str()));
        tokio::fs::create_dir_all(&tender_dir).await?;

        let mut taken = HashSet::new();
        for document in &tender.documents {
            let name = unique_name(file_name(document), &mut taken);
            let path = tender_dir.join(&name);

            match self.save(&document.url, &path).await {
                Ok(bytes) => {
                    debug!(id = %tender.id, path = %path.display(), bytes, "Saved document");
                    summary.saved.push(SavedDocument {
                        tender: tender.id.to_string(),
                        url: document.url.clone(),
                        path,
                        bytes,
                    });
                }
                Err(e) => {
                    warn!(id = %tender.id, url = %document.url, error = %e, "Document download failed");
                    summary.failed.push(FailedDownload {
                        tender: tender.id.to_string(),
                        url: document.url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }

    async fn save(&self, url: &str, path: &Path) -> DownloadResult<usize> {
        self.gate.ready().await;
        let body = self.fetcher.fetch_bytes(url, self.timeout).await?;
        tokio::fs::write(path, &body).await?;
        Ok(body.len())
    }
}

fn tender_dir_name(id: &str) -> String {
    sanitize(id)
}

/// Extensions of portal pages that serve an attachment rather than name it.
const PAGE_EXTENSIONS: &[&str] = &["aspx", "asp", "htm", "html", "php", "jsp"];

fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .filter(|ext| !PAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// File name for a document: the link text when it names a file, then the
/// URL's last path segment, then the link text as is.
pub fn file_name(document: &DocumentDescriptor) -> String {
    if file_extension(&document.filename).is_some() {
        return sanitize(&document.filename);
    }
    let from_url = Url::parse(&document.url).ok().and_then(|url| {
        url.path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|segment| file_extension(segment).is_some())
    });
    sanitize(from_url.as_deref().unwrap_or(&document.filename))
}

/// Keep `[A-Za-z0-9._-]`, replace everything else with `_`.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Suffix `-2`, `-3`, ... before the extension until the name is free.
fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name.as_str(), ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}{ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        identifier::TenderIdentifier,
        outcome::{ExtractionFailure, ExtractionOutcome},
        request::Strategy,
        tender::ParsedFields,
    };
    use crate::error::ErrorKind;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tender_with(id: &str, documents: Vec<DocumentDescriptor>) -> ExtractedFields {
        let mut parsed = ParsedFields::new().with_title("Mobiliario").with_entity("Municipalidad");
        parsed.documents = documents;
        ExtractedFields::from_parsed(
            TenderIdentifier::parse(id).unwrap(),
            format!("https://portal/{id}"),
            parsed,
            Strategy::Static,
        )
    }

    #[test]
    fn test_file_name_sources() {
        let doc = DocumentDescriptor::new("Bases administrativas", "https://x/Attachment/bases_admin.pdf?v=2");
        assert_eq!(file_name(&doc), "bases_admin.pdf");

        let doc = DocumentDescriptor::new("Anexo tecnico.docx", "https://x/ViewAttachment.aspx?enc=abc");
        assert_eq!(file_name(&doc), "Anexo_tecnico.docx");

        let doc = DocumentDescriptor::new("Anexo 1", "https://x/ViewAttachment.aspx?enc=abc");
        assert_eq!(file_name(&doc), "Anexo_1");

        let doc = DocumentDescriptor::new("../..", "not a url");
        assert_eq!(file_name(&doc), "_..");
    }

    #[test]
    fn test_unique_name_suffixes_before_extension() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("bases.pdf".into(), &mut taken), "bases.pdf");
        assert_eq!(unique_name("bases.pdf".into(), &mut taken), "bases-2.pdf");
        assert_eq!(unique_name("bases.pdf".into(), &mut taken), "bases-3.pdf");
        assert_eq!(unique_name("anexo".into(), &mut taken), "anexo");
        assert_eq!(unique_name("anexo".into(), &mut taken), "anexo-2");
    }

    #[tokio::test]
    async fn test_download_report_saves_per_tender() {
        let server = MockServer::start().await;
        Mock::given(path("/Attachment/bases.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/other/bases.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/Attachment/captcha.zip"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let tender = tender_with(
            "1234-567-L123",
            vec![
                DocumentDescriptor::new("Bases", format!("{}/Attachment/bases.pdf", server.uri())),
                DocumentDescriptor::new("Bases", format!("{}/other/bases.pdf", server.uri())),
                DocumentDescriptor::new("Anexo", format!("{}/Attachment/captcha.zip", server.uri())),
            ],
        );
        let report = ExtractionReport {
            outcomes: vec![
                ExtractionOutcome::Success(tender),
                ExtractionOutcome::Failure(ExtractionFailure::new(
                    "9999-1-L1",
                    ErrorKind::Permanent,
                    1,
                    "http status 404",
                )),
            ],
            cancelled: false,
        };

        let dir = tempfile::tempdir().unwrap();
        let downloader = DocumentDownloader::new(HttpFetcher::new().unwrap(), dir.path());
        let summary = downloader.download_report(&report).await.unwrap();

        let tender_dir = dir.path().join("1234-567-L123");
        assert_eq!(summary.saved.len(), 2);
        assert_eq!(summary.saved[0].path, tender_dir.join("bases.pdf"));
        assert_eq!(summary.saved[1].path, tender_dir.join("bases-2.pdf"));
        assert_eq!(std::fs::read(tender_dir.join("bases.pdf")).unwrap(), b"%PDF-1.7");
        assert_eq!(summary.total_bytes(), 16);

        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].url.ends_with("captcha.zip"));
        assert!(!tender_dir.join("captcha.zip").exists());
        assert!(!dir.path().join("9999-1-L1").exists());
    }

    #[tokio::test]
    async fn test_tender_without_documents_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = DocumentDownloader::new(HttpFetcher::new().unwrap(), dir.path());

        let summary = downloader
            .download_tender(&tender_with("1234-567-L123", Vec::new()))
            .await
            .unwrap();

        assert!(summary.saved.is_empty());
        assert!(summary.failed.is_empty());
        assert!(!dir.path().join("1234-567-L123").exists());
    }
}
