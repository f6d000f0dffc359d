//! HTTP fetcher implementation.
//!
//! Plain reqwest GET with browser-like headers. One request per call; the
//! engine owns retries and pacing.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::Fetcher;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Static page fetcher backed by a shared `reqwest::Client`.
///
/// The client pools connections, so one fetcher should be shared by every
/// worker.
///
/// # Example
///
/// ```rust,ignore
/// use tender_extraction::fetchers::HttpFetcher;
///
/// let fetcher = HttpFetcher::new()?;
/// let html = fetcher.fetch(url, Duration::from_secs(10)).await?;
/// ```
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with default headers and redirect policy.
    pub fn new() -> FetchResult<Self> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    /// Create a fetcher with a custom user agent.
    pub fn with_user_agent(user_agent: &str) -> FetchResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-CL,es;q=0.9,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Connection(Box::new(e)))?;

        Ok(Self { client })
    }

    /// Use a preconfigured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn map_send_error(url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            FetchError::Connection(Box::new(e))
        }
    }

    /// GET `url`, failing on a non-success status.
    async fn get(&self, url: &str, timeout: Duration) -> FetchResult<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "HTTP request failed");
                Self::map_send_error(url, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "HTTP non-success status");
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Fetch a binary body, such as a tender attachment.
    pub async fn fetch_bytes(&self, url: &str, timeout: Duration) -> FetchResult<Vec<u8>> {
        debug!(url = %url, "HTTP download starting");
        let body = self
            .get(url, timeout)
            .await?
            .bytes()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;

        debug!(url = %url, content_length = body.len(), "Download complete");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchResult<String> {
        debug!(url = %url, "HTTP fetch starting");
        let html = self
            .get(url, timeout)
            .await?
            .text()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;

        debug!(url = %url, content_length = html.len(), "Page fetched successfully");
        Ok(html)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tender"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Hola</h1>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let html = fetcher
            .fetch(&format!("{}/tender", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(html, "<h1>Hola</h1>");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(path("/throttled"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let timeout = Duration::from_secs(5);

        let missing = fetcher
            .fetch(&format!("{}/missing", server.uri()), timeout)
            .await
            .unwrap_err();
        assert!(matches!(missing, FetchError::Status { status: 404, .. }));
        assert_eq!(missing.kind(), ErrorKind::Permanent);

        let busy = fetcher
            .fetch(&format!("{}/busy", server.uri()), timeout)
            .await
            .unwrap_err();
        assert_eq!(busy.kind(), ErrorKind::Transient);

        let throttled = fetcher
            .fetch(&format!("{}/throttled", server.uri()), timeout)
            .await
            .unwrap_err();
        assert_eq!(throttled.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_fetch_bytes_keeps_binary_body() {
        let server = MockServer::start().await;
        let body = vec![0x25, 0x50, 0x44, 0x46, 0x00, 0xff];
        Mock::given(path("/Attachment/bases.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let fetched = fetcher
            .fetch_bytes(&format!("{}/Attachment/bases.pdf", server.uri()), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(fetched, body);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher
            .fetch(&format!("{}/slow", server.uri()), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }
}
