//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the extraction engine
//! without making real network calls or launching a browser.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::{FetchError, FetchResult, RenderError, RenderResult};
use crate::traits::{
    fetcher::Fetcher,
    renderer::{RenderLauncher, Renderer},
};

/// Build a minimal detail page the built-in parser understands.
pub fn tender_html(title: &str, entity: &str, offers: u32) -> String {
    format!(
        r#"<html><body>
<span id="lblNombreLicitacion">{title}</span>
<span id="lblOrganismo">{entity}</span>
<span id="lblNumeroOfertas">{offers}</span>
</body></html>"#
    )
}

/// A page shell whose content is filled in by scripts.
pub fn script_shell_html() -> String {
    r#"<html><body><div id="app"></div><script src="/app.js"></script></body></html>"#.to_string()
}

/// Scripted response for a mock fetch.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Html(String),
    Status(u16),
    Timeout,
    ConnectionReset,
}

/// Scripted response for a mock render.
#[derive(Debug, Clone)]
pub enum MockRenderResponse {
    Html(String),
    Timeout,
    Crash,
}

/// Shared instrumentation: concurrent calls and dispatch times.
///
/// Hand one tracker to several mocks to observe them together.
#[derive(Debug, Clone, Default)]
pub struct CallTracker {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    dispatches: Arc<RwLock<Vec<Instant>>>,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest number of simultaneous calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Start instant of every call, in call order.
    pub fn dispatches(&self) -> Vec<Instant> {
        self.dispatches.read().unwrap().clone()
    }

    /// Time between the first and last dispatch start.
    pub fn dispatch_span(&self) -> Duration {
        let dispatches = self.dispatches.read().unwrap();
        match (dispatches.iter().min(), dispatches.iter().max()) {
            (Some(first), Some(last)) => last.duration_since(*first),
            _ => Duration::ZERO,
        }
    }

    fn enter(&self) -> TrackerGuard<'_> {
        self.dispatches.write().unwrap().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        TrackerGuard { tracker: self }
    }
}

struct TrackerGuard<'a> {
    tracker: &'a CallTracker,
}

impl Drop for TrackerGuard<'_> {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-key response queues. The last response of a queue repeats.
#[derive(Debug)]
struct Script<T> {
    by_key: Vec<(String, VecDeque<T>)>,
    fallback: Option<T>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            by_key: Vec::new(),
            fallback: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self, url: &str) -> Option<T> {
        let queue = self
            .by_key
            .iter_mut()
            .find(|(key, _)| url.contains(key.as_str()))
            .map(|(_, queue)| queue);

        match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => self.fallback.clone(),
        }
    }
}

/// Mock fetcher with per-identifier scripted responses and call tracking.
///
/// Responses are matched by substring of the requested URL, so the tender
/// identifier is a convenient key.
///
/// # Example
///
/// ```rust
/// use tender_extraction::testing::{MockFetcher, MockResponse};
///
/// let fetcher = MockFetcher::new()
///     .respond("1234-567-L123", [MockResponse::Status(503), MockResponse::Status(404)]);
/// ```
#[derive(Clone, Default)]
pub struct MockFetcher {
    script: Arc<RwLock<Script<MockResponse>>>,
    calls: Arc<RwLock<Vec<String>>>,
    latency: Duration,
    tracker: CallTracker,
}

impl MockFetcher {
    /// Create a mock that answers 404 to anything unscripted.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.script.write().unwrap().fallback = Some(MockResponse::Status(404));
        mock
    }

    /// Script a response sequence for URLs containing `key`.
    pub fn respond(self, key: impl Into<String>, responses: impl IntoIterator<Item = MockResponse>) -> Self {
        self.script
            .write()
            .unwrap()
            .by_key
            .push((key.into(), responses.into_iter().collect()));
        self
    }

    /// Serve `html` for URLs containing `key`.
    pub fn with_page(self, key: impl Into<String>, html: impl Into<String>) -> Self {
        self.respond(key, [MockResponse::Html(html.into())])
    }

    /// Response for unscripted URLs.
    pub fn with_default(self, response: MockResponse) -> Self {
        self.script.write().unwrap().fallback = Some(response);
        self
    }

    /// Simulated network latency per call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Record calls on a shared tracker.
    pub fn with_tracker(mut self, tracker: CallTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &CallTracker {
        &self.tracker
    }

    /// Get the number of fetch calls.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Get the number of fetch calls for URLs containing `key`.
    pub fn calls_for(&self, key: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|url| url.contains(key))
            .count()
    }

    /// Get the URLs that were requested.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> FetchResult<String> {
        let _guard = self.tracker.enter();
        self.calls.write().unwrap().push(url.to_string());
        let response = self.script.write().unwrap().next(url);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match response.unwrap_or(MockResponse::Status(404)) {
            MockResponse::Html(html) => Ok(html),
            MockResponse::Status(status) => Err(FetchError::Status {
                status,
                url: url.to_string(),
            }),
            MockResponse::Timeout => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
            MockResponse::ConnectionReset => {
                Err(FetchError::Connection("connection reset by peer".into()))
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock browser. Clones share state, so a test can keep a handle to the
/// renderer its launcher hands out.
///
/// A render opens a page (`open_delay`), loads it under the render's own
/// deadline (`latency`), then closes the page whether or not it loaded.
#[derive(Clone, Default)]
pub struct MockRenderer {
    script: Arc<RwLock<Script<MockRenderResponse>>>,
    calls: Arc<RwLock<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    pages_closed: Arc<AtomicUsize>,
    open_delay: Duration,
    latency: Duration,
    tracker: CallTracker,
}

impl MockRenderer {
    /// Create a mock that renders an empty shell for anything unscripted.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.script.write().unwrap().fallback = Some(MockRenderResponse::Html(script_shell_html()));
        mock
    }

    pub fn respond(
        self,
        key: impl Into<String>,
        responses: impl IntoIterator<Item = MockRenderResponse>,
    ) -> Self {
        self.script
            .write()
            .unwrap()
            .by_key
            .push((key.into(), responses.into_iter().collect()));
        self
    }

    pub fn with_page(self, key: impl Into<String>, html: impl Into<String>) -> Self {
        self.respond(key, [MockRenderResponse::Html(html.into())])
    }

    /// Page rendered for unscripted URLs.
    pub fn with_default_page(self, html: impl Into<String>) -> Self {
        self.script.write().unwrap().fallback = Some(MockRenderResponse::Html(html.into()));
        self
    }

    /// Time to load a page; bounded by the render timeout.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Time to open a page before the load deadline starts.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_tracker(mut self, tracker: CallTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Get the number of render calls.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|url| url.contains(key))
            .count()
    }

    /// Get the number of times `close` was called.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Get the number of pages closed after a render.
    pub fn pages_closed(&self) -> usize {
        self.pages_closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> RenderResult<String> {
        let _guard = self.tracker.enter();
        self.calls.write().unwrap().push(url.to_string());
        let response = self.script.write().unwrap().next(url);

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        let loaded = tokio::time::timeout(timeout, tokio::time::sleep(self.latency)).await;
        self.pages_closed.fetch_add(1, Ordering::SeqCst);
        if loaded.is_err() {
            return Err(RenderError::Timeout {
                url: url.to_string(),
            });
        }

        match response.unwrap_or_else(|| MockRenderResponse::Html(script_shell_html())) {
            MockRenderResponse::Html(html) => Ok(html),
            MockRenderResponse::Timeout => Err(RenderError::Timeout {
                url: url.to_string(),
            }),
            MockRenderResponse::Crash => Err(RenderError::Browser("target crashed".to_string())),
        }
    }

    async fn close(&self) -> RenderResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock launcher that hands out a shared [`MockRenderer`].
#[derive(Clone, Default)]
pub struct MockLauncher {
    renderer: MockRenderer,
    launches: Arc<AtomicUsize>,
    fail: bool,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::with_renderer(MockRenderer::new())
    }

    pub fn with_renderer(renderer: MockRenderer) -> Self {
        Self {
            renderer,
            launches: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    /// A launcher whose browser never starts.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Handle to the renderer this launcher hands out.
    pub fn renderer(&self) -> &MockRenderer {
        &self.renderer
    }

    /// Get the number of launch calls.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderLauncher for MockLauncher {
    type Renderer = MockRenderer;

    async fn launch(&self) -> RenderResult<MockRenderer> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RenderError::Launch("chrome binary not found".to_string()));
        }
        Ok(self.renderer.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetcher_sequence_repeats_last() {
        let fetcher = MockFetcher::new().respond(
            "1-1-L1",
            [MockResponse::Status(503), MockResponse::Html("ok".into())],
        );
        let timeout = Duration::from_secs(1);

        assert!(fetcher.fetch("https://x/?id=1-1-L1", timeout).await.is_err());
        assert_eq!(fetcher.fetch("https://x/?id=1-1-L1", timeout).await.unwrap(), "ok");
        assert_eq!(fetcher.fetch("https://x/?id=1-1-L1", timeout).await.unwrap(), "ok");
        assert_eq!(fetcher.calls_for("1-1-L1"), 3);
    }

    #[tokio::test]
    async fn test_mock_fetcher_unscripted_is_404() {
        let fetcher = MockFetcher::new();
        let err = fetcher
            .fetch("https://x/?id=9-9-L9", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_tracker_counts_concurrency() {
        let tracker = CallTracker::new();
        let fetcher = MockFetcher::new()
            .with_default(MockResponse::Html("ok".into()))
            .with_latency(Duration::from_millis(20))
            .with_tracker(tracker.clone());
        let timeout = Duration::from_secs(1);

        let _ = tokio::join!(
            fetcher.fetch("a", timeout),
            fetcher.fetch("b", timeout),
            fetcher.fetch("c", timeout),
        );

        assert_eq!(tracker.max_in_flight(), 3);
        assert_eq!(tracker.dispatches().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_launcher_shares_renderer() {
        let launcher = MockLauncher::new();
        let renderer = launcher.launch().await.unwrap();
        renderer.close().await.unwrap();

        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(launcher.renderer().close_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_renderer_closes_page_on_timeout() {
        let renderer = MockRenderer::new().with_latency(Duration::from_secs(5));
        let err = renderer
            .render("https://x/?id=1-1-L1", Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::Timeout { .. }));
        assert_eq!(renderer.pages_closed(), 1);
    }
}
