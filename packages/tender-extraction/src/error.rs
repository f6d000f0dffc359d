//! Typed errors for the tender extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Collaborator errors (`FetchError`, `RenderError`, `ParseError`) never
//! escape the engine: they are classified into an [`ErrorKind`] and recorded
//! on the identifier's outcome. Only [`EngineError`] is returned to callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Run-wide errors returned by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid engine configuration, rejected at construction
    #[error("config error: {reason}")]
    Config { reason: String },

    /// Operation attempted after `shutdown()`
    #[error("lifecycle error: {0}")]
    Lifecycle(&'static str),
}

impl EngineError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

/// Errors from a single static fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request did not complete within the attempt timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Connection refused, reset, DNS failure, or body read failure
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Upstream answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
}

/// Errors from the rendering collaborator.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Navigation or rendering exceeded the attempt timeout
    #[error("timeout rendering: {url}")]
    Timeout { url: String },

    /// The browser session failed mid-render (crash, protocol error)
    #[error("browser error: {0}")]
    Browser(String),

    /// The browser process could not be started
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// No rendering backend is configured
    #[error("rendering unavailable")]
    Unavailable,
}

/// Errors from the content parser.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The markup could not be interpreted as a tender page
    #[error("malformed content: {reason}")]
    MalformedContent { reason: String },
}

/// Errors from writing results to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Underlying writer failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors from saving a tender attachment.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The document could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The document could not be written to disk
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of a per-identifier failure.
///
/// Recorded on every [`crate::ExtractionFailure`]; drives the retry state
/// machine in [`crate::engine::retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Identifier failed the token grammar; never dispatched
    InvalidIdentifier,
    /// Timeout, connection failure, 5xx or 429; retried
    Transient,
    /// 4xx other than 429, or an unusable backend; never retried
    Permanent,
    /// Page parsed but lacks the required fields; triggers fallback
    ParseInsufficient,
    /// The run was cancelled before this identifier finished
    Cancelled,
}

impl ErrorKind {
    /// Whether retrying the same strategy could change the result.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidIdentifier => "invalid_identifier",
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::ParseInsufficient => "parse_insufficient",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FetchError {
    /// Classify a fetch failure for the retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout { .. } | FetchError::Connection(_) => ErrorKind::Transient,
            FetchError::Status { status, .. } => classify_status(*status),
        }
    }
}

impl RenderError {
    /// Classify a render failure for the retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Timeout { .. } | RenderError::Browser(_) => ErrorKind::Transient,
            RenderError::Launch(_) | RenderError::Unavailable => ErrorKind::Permanent,
        }
    }
}

/// Map an HTTP status to a failure kind.
///
/// 429 and 5xx are retryable; every other non-success status is permanent.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        429 => ErrorKind::Transient,
        500..=599 => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for render operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Result type alias for parse operations.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Result type alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Result type alias for attachment downloads.
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(404), ErrorKind::Permanent);
        assert_eq!(classify_status(403), ErrorKind::Permanent);
        assert_eq!(classify_status(429), ErrorKind::Transient);
        assert_eq!(classify_status(500), ErrorKind::Transient);
        assert_eq!(classify_status(503), ErrorKind::Transient);
    }

    #[test]
    fn test_fetch_error_kinds() {
        let timeout = FetchError::Timeout {
            url: "https://example.com".into(),
        };
        assert_eq!(timeout.kind(), ErrorKind::Transient);

        let reset = FetchError::Connection("connection reset".into());
        assert_eq!(reset.kind(), ErrorKind::Transient);

        let gone = FetchError::Status {
            status: 410,
            url: "https://example.com".into(),
        };
        assert_eq!(gone.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_render_error_kinds() {
        assert_eq!(RenderError::Browser("crashed".into()).kind(), ErrorKind::Transient);
        assert_eq!(RenderError::Unavailable.kind(), ErrorKind::Permanent);
        assert!(!ErrorKind::Permanent.is_retryable());
        assert!(ErrorKind::Transient.is_retryable());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ParseInsufficient).unwrap();
        assert_eq!(json, "\"parse_insufficient\"");
    }
}
