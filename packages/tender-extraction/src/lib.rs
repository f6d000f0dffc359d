//! Concurrent Tender Extraction Library
//!
//! Extracts structured tender records (title, buying entity, offer count,
//! attached documents) from Mercado Público detail pages for batches of
//! tender identifiers.
//!
//! # Design Philosophy
//!
//! - Static first: a plain fetch is tried before a headless browser
//! - Every input position yields exactly one outcome, success or classified failure
//! - Per-identifier failures never abort a run
//! - Collaborators (fetch, render, parse) are traits the engine is generic over
//!
//! # Usage
//!
//! ```rust,ignore
//! use tender_extraction::{EngineConfig, ExtractionEngine, HttpFetcher, NoopLauncher, TenderPageParser};
//!
//! let engine = ExtractionEngine::new(
//!     EngineConfig::from_env()?,
//!     HttpFetcher::new()?,
//!     NoopLauncher,
//!     TenderPageParser::new(),
//! )?;
//!
//! let report = engine.extract_many(&["1234-567-L123", "5678-12-LE24"]).await?;
//! for tender in report.successes() {
//!     println!("{}: {}", tender.id, tender.title);
//! }
//! engine.shutdown().await?;
//! ```
//!
//! # Modules
//!
//! - [`engine`] - Extraction engine, retry policy, dispatch gate and render pool
//! - [`traits`] - Collaborator contracts (Fetcher, RenderLauncher, ContentParser, ResultSink)
//! - [`types`] - Identifiers, configuration, extracted records and outcomes
//! - [`fetchers`] - HTTP fetcher
//! - [`renderers`] - Headless browser launcher
//! - [`parser`] - Detail page parser
//! - [`sinks`] - JSON and CSV export
//! - [`downloader`] - Saves tender attachments to disk
//! - [`testing`] - Mock implementations for testing

pub mod downloader;
pub mod engine;
pub mod error;
pub mod fetchers;
pub mod parser;
pub mod renderers;
pub mod sinks;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use downloader::{DocumentDownloader, DownloadSummary};
pub use engine::{ExtractionEngine, RunOptions, StatsSnapshot};
pub use error::{
    DownloadError, DownloadResult, EngineError, EngineResult, ErrorKind, FetchError, ParseError,
    RenderError, SinkError,
};
pub use fetchers::HttpFetcher;
pub use parser::TenderPageParser;
pub use renderers::{NoopLauncher, NoopRenderer};
#[cfg(feature = "chromium")]
pub use renderers::{ChromiumLauncher, ChromiumRenderer};
pub use sinks::{CsvSink, FailureCsvSink, JsonSink};
pub use traits::{
    fetcher::Fetcher,
    parser::ContentParser,
    renderer::{RenderLauncher, Renderer},
    sink::ResultSink,
};
pub use types::{
    config::EngineConfig,
    identifier::{InvalidIdentifier, TenderIdentifier},
    outcome::{ExtractionFailure, ExtractionOutcome, ExtractionReport},
    request::{ExtractionRequest, Strategy},
    tender::{DocumentDescriptor, DocumentType, ExtractedFields, ParsedFields, TenderField},
};
pub use tokio_util::sync::CancellationToken;
