//! Fetcher trait for the static extraction path.
//!
//! A fetcher performs exactly one network request per call. Retries,
//! pacing and fallback are the engine's job, so implementations must not
//! retry or sleep on their own.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tender_extraction::traits::fetcher::Fetcher;
//!
//! let html = fetcher.fetch(&url, Duration::from_secs(10)).await?;
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchResult;

/// Single-shot HTML fetch.
///
/// Implementations:
/// - `HttpFetcher` - reqwest client with a browser-like User-Agent
/// - `MockFetcher` - scripted responses for tests
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the body of `url`, failing with `Timeout` if it takes longer
    /// than `timeout`.
    ///
    /// Non-2xx responses must be reported as `FetchError::Status` so the
    /// engine can classify them.
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchResult<String>;

    /// Get the fetcher name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchResult<String> {
        (**self).fetch(url, timeout).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
