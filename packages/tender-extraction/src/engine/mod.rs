//! Concurrent extraction engine.
//!
//! The engine drives each identifier through the static strategy first and
//! falls back to rendering when the static page falls short:
//!
//! ```text
//! identifier ─▶ validate ─▶ [gate] ─▶ fetch ─▶ parse ─┬─▶ Success
//!                              ▲                      │
//!                              └──── RetryPolicy ◀────┘ (retry / fall back / fail)
//! ```
//!
//! A batch is drained by a fixed set of workers sharing one cursor, so at
//! most `max_concurrent` identifiers are in flight regardless of input size.

pub mod rate_limit;
pub mod render_pool;
pub mod retry;

use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{
    EngineError, EngineResult, ErrorKind, FetchError, ParseError, RenderError,
};
use crate::traits::{
    fetcher::Fetcher,
    parser::ContentParser,
    renderer::RenderLauncher,
};
use crate::types::{
    config::EngineConfig,
    identifier::TenderIdentifier,
    outcome::{ExtractionFailure, ExtractionOutcome, ExtractionReport},
    request::{ExtractionRequest, Strategy},
    tender::{ExtractedFields, ParsedFields},
};

pub use rate_limit::DispatchGate;
pub use render_pool::{RenderLease, RenderPool};
pub use retry::{RetryPolicy, Transition};

/// Per-run overrides for [`ExtractionEngine::extract_many_with`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides `EngineConfig::max_concurrent` for this run
    pub max_concurrent: Option<usize>,

    /// Stops the run early when cancelled
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = Some(max);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Attempt counters, accumulated over the engine's lifetime.
#[derive(Debug, Default)]
struct EngineStats {
    static_attempts: AtomicU64,
    rendered_attempts: AtomicU64,
    retries: AtomicU64,
    fallbacks: AtomicU64,
}

/// Point-in-time copy of the engine's attempt counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub static_attempts: u64,
    pub rendered_attempts: u64,
    pub retries: u64,
    pub fallbacks: u64,
}

impl EngineStats {
    fn record_attempt(&self, strategy: Strategy) {
        let counter = match strategy {
            Strategy::Static => &self.static_attempts,
            Strategy::Rendered => &self.rendered_attempts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            static_attempts: self.static_attempts.load(Ordering::Relaxed),
            rendered_attempts: self.rendered_attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Extra time a renderer gets past the page timeout to close its page.
///
/// Renderers enforce the page timeout themselves; the engine's own deadline
/// only catches one that hangs.
const RENDER_GRACE: Duration = Duration::from_secs(2);

/// Why a single attempt did not produce enough fields.
#[derive(Debug)]
struct AttemptFailure {
    kind: ErrorKind,
    message: String,
    /// No render session could be started, so nothing was dispatched.
    no_renderer: bool,
}

impl AttemptFailure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            no_renderer: false,
        }
    }

    fn cancelled(message: &str) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }
}

impl From<FetchError> for AttemptFailure {
    fn from(e: FetchError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<RenderError> for AttemptFailure {
    fn from(e: RenderError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<ParseError> for AttemptFailure {
    fn from(e: ParseError) -> Self {
        Self::new(ErrorKind::ParseInsufficient, e.to_string())
    }
}

/// Batch extraction engine.
///
/// Owns the shared render pool and the dispatch gate; the fetcher and
/// parser are stateless collaborators shared across workers.
pub struct ExtractionEngine<F, L, P>
where
    F: Fetcher,
    L: RenderLauncher,
    P: ContentParser,
{
    config: EngineConfig,
    fetcher: F,
    parser: P,
    render_pool: RenderPool<L>,
    gate: DispatchGate,
    policy: RetryPolicy,
    stats: EngineStats,
    shut_down: AtomicBool,
}

impl<F, L, P> ExtractionEngine<F, L, P>
where
    F: Fetcher,
    L: RenderLauncher,
    P: ContentParser,
{
    /// Create an engine. Fails if the configuration is invalid.
    ///
    /// Nothing is launched here; the browser starts on the first render.
    pub fn new(config: EngineConfig, fetcher: F, launcher: L, parser: P) -> EngineResult<Self> {
        config.validate()?;

        let render_pool = RenderPool::new(launcher, config.effective_render_sessions());
        let gate = DispatchGate::new(config.request_delay());
        let policy = RetryPolicy::from_config(&config);

        debug!(
            fetcher = fetcher.name(),
            max_concurrent = config.max_concurrent,
            request_delay = ?gate.interval(),
            max_retries = config.max_retries,
            render_sessions = render_pool.size(),
            "Extraction engine ready"
        );

        Ok(Self {
            config,
            fetcher,
            parser,
            render_pool,
            gate,
            policy,
            stats: EngineStats::default(),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Attempt counters since construction.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of browser launches so far (0 or 1).
    pub fn render_launch_count(&self) -> usize {
        self.render_pool.launch_count()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> EngineResult<()> {
        if self.is_shut_down() {
            return Err(EngineError::Lifecycle("engine has been shut down"));
        }
        Ok(())
    }

    /// Extract a single tender.
    ///
    /// Per-identifier problems are reported as `Failure` outcomes; the only
    /// error is calling this after [`shutdown`](Self::shutdown).
    pub async fn extract_one(&self, identifier: &str) -> EngineResult<ExtractionOutcome> {
        self.ensure_running()?;
        Ok(self.run_identifier(identifier, &CancellationToken::new()).await)
    }

    /// Extract a batch with the configured concurrency.
    pub async fn extract_many<S>(&self, identifiers: &[S]) -> EngineResult<ExtractionReport>
    where
        S: AsRef<str> + Sync,
    {
        self.extract_many_with(identifiers, RunOptions::default()).await
    }

    /// Extract a batch with per-run overrides.
    ///
    /// `outcomes[i]` always corresponds to `identifiers[i]`. On cancellation
    /// finished outcomes are kept and every other position is marked
    /// `Cancelled`.
    pub async fn extract_many_with<S>(
        &self,
        identifiers: &[S],
        options: RunOptions,
    ) -> EngineResult<ExtractionReport>
    where
        S: AsRef<str> + Sync,
    {
        self.ensure_running()?;

        let max_concurrent = options.max_concurrent.unwrap_or(self.config.max_concurrent);
        if max_concurrent == 0 {
            return Err(EngineError::config("max_concurrent must be greater than 0"));
        }
        let cancel = options.cancel.unwrap_or_default();

        let (work, aliases) = self.plan(identifiers);
        let workers = max_concurrent.min(work.len());

        info!(
            identifiers = identifiers.len(),
            dispatched = work.len(),
            workers,
            "Starting extraction run"
        );

        let cursor = AtomicUsize::new(0);
        let finished = join_all(
            (0..workers).map(|worker| self.worker(worker, identifiers, &work, &cursor, &cancel)),
        )
        .await;

        let mut slots: Vec<Option<ExtractionOutcome>> = vec![None; identifiers.len()];
        for (position, outcome) in finished.into_iter().flatten() {
            slots[position] = Some(outcome);
        }
        for (position, first) in aliases {
            slots[position] = slots[first].clone();
        }

        let outcomes: Vec<ExtractionOutcome> = slots
            .into_iter()
            .zip(identifiers)
            .map(|(slot, raw)| {
                slot.unwrap_or_else(|| {
                    ExtractionOutcome::Failure(ExtractionFailure::new(
                        AsRef::<str>::as_ref(raw),
                        ErrorKind::Cancelled,
                        0,
                        "not dispatched: run cancelled",
                    ))
                })
            })
            .collect();

        let report = ExtractionReport {
            outcomes,
            cancelled: cancel.is_cancelled(),
        };

        info!(
            succeeded = report.success_count(),
            failed = report.failure_count(),
            cancelled = report.cancelled,
            "Extraction run complete"
        );

        Ok(report)
    }

    /// Release the shared browser. Idempotent.
    ///
    /// Waits for in-flight renders to return their sessions first.
    pub async fn shutdown(&self) -> EngineResult<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Engine already shut down");
            return Ok(());
        }

        match self.render_pool.close().await {
            Ok(true) => info!("Browser released"),
            Ok(false) => debug!("No browser to release"),
            Err(e) => warn!(error = %e, "Browser did not close cleanly"),
        }
        Ok(())
    }

    /// Split positions into those to dispatch and those that reuse an
    /// earlier position's outcome.
    fn plan<S: AsRef<str>>(&self, identifiers: &[S]) -> (Vec<usize>, Vec<(usize, usize)>) {
        if !self.config.dedupe_identifiers {
            return ((0..identifiers.len()).collect(), Vec::new());
        }

        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        let mut work = Vec::new();
        let mut aliases = Vec::new();
        for (position, raw) in identifiers.iter().enumerate() {
            let key = AsRef::<str>::as_ref(raw).trim();
            match first_seen.get(key) {
                Some(&first) => aliases.push((position, first)),
                None => {
                    first_seen.insert(key, position);
                    work.push(position);
                }
            }
        }
        (work, aliases)
    }

    /// Take positions off the shared cursor until the work runs out or the
    /// run is cancelled.
    async fn worker<S: AsRef<str>>(
        &self,
        worker: usize,
        identifiers: &[S],
        work: &[usize],
        cursor: &AtomicUsize,
        cancel: &CancellationToken,
    ) -> Vec<(usize, ExtractionOutcome)> {
        let mut done = Vec::new();
        loop {
            if cancel.is_cancelled() {
                debug!(worker, "Run cancelled, worker stopping");
                break;
            }
            let Some(&position) = work.get(cursor.fetch_add(1, Ordering::SeqCst)) else {
                break;
            };
            let raw = AsRef::<str>::as_ref(&identifiers[position]);
            let outcome = self.run_identifier(raw, cancel).await;
            done.push((position, outcome));
        }
        done
    }

    /// Full retry/fallback sequence for one identifier.
    async fn run_identifier(&self, raw: &str, cancel: &CancellationToken) -> ExtractionOutcome {
        let identifier = match TenderIdentifier::parse(raw) {
            Ok(id) => id,
            Err(e) => {
                debug!(input = raw, "Rejected identifier");
                return ExtractionOutcome::Failure(ExtractionFailure::new(
                    raw,
                    ErrorKind::InvalidIdentifier,
                    0,
                    e.to_string(),
                ));
            }
        };

        let url = self.config.tender_url(&identifier);
        let page_url = match Url::parse(&url) {
            Ok(page_url) => page_url,
            Err(e) => {
                return ExtractionOutcome::Failure(ExtractionFailure::new(
                    raw,
                    ErrorKind::Permanent,
                    0,
                    format!("invalid tender url {url}: {e}"),
                ));
            }
        };

        let mut request = ExtractionRequest::new(identifier, url);
        // The failure that triggered the fallback, kept in case rendering
        // turns out to be unavailable.
        let mut fallback_cause: Option<AttemptFailure> = None;
        loop {
            let failure = match self.attempt(&mut request, &page_url, cancel).await {
                Ok(parsed) => {
                    debug!(
                        id = %request.identifier,
                        strategy = %request.strategy,
                        attempts = request.total_attempts,
                        "Extracted tender"
                    );
                    return ExtractionOutcome::Success(ExtractedFields::from_parsed(
                        request.identifier,
                        request.url,
                        parsed,
                        request.strategy,
                    ));
                }
                Err(failure) => failure,
            };

            debug!(
                id = %request.identifier,
                strategy = %request.strategy,
                attempt = request.attempt,
                kind = %failure.kind,
                error = %failure.message,
                "Attempt failed"
            );

            if failure.no_renderer {
                if let Some(cause) = fallback_cause.take() {
                    let message = format!("{}; {}", cause.message, failure.message);
                    warn!(
                        id = %request.identifier,
                        kind = %cause.kind,
                        attempts = request.total_attempts,
                        error = %message,
                        "Extraction failed, rendering unavailable"
                    );
                    return Self::failed(raw, &request, cause.kind, &message);
                }
            }

            match self.policy.next(request.strategy, request.attempt, failure.kind) {
                Transition::Retry { delay } => {
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Self::failed(raw, &request, ErrorKind::Cancelled, "cancelled during backoff");
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Transition::FallBack { to } => {
                    self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                    debug!(id = %request.identifier, from = %request.strategy, to = %to, "Falling back");
                    request.switch_to(to);
                    fallback_cause = Some(failure);
                }
                Transition::Fail(kind) => {
                    warn!(
                        id = %request.identifier,
                        kind = %kind,
                        attempts = request.total_attempts,
                        error = %failure.message,
                        "Extraction failed"
                    );
                    return Self::failed(raw, &request, kind, &failure.message);
                }
            }
        }
    }

    /// One attempt with the request's current strategy.
    async fn attempt(
        &self,
        request: &mut ExtractionRequest,
        page_url: &Url,
        cancel: &CancellationToken,
    ) -> Result<ParsedFields, AttemptFailure> {
        if cancel.is_cancelled() {
            return Err(AttemptFailure::cancelled("run cancelled"));
        }

        // Take a render session before queueing at the gate, so a dispatch
        // slot is never spent waiting for the browser.
        let lease = match request.strategy {
            Strategy::Static => None,
            Strategy::Rendered => {
                let acquired = tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(AttemptFailure::cancelled("cancelled waiting for a render session"));
                    }
                    acquired = self.render_pool.acquire() => acquired,
                };
                match acquired {
                    Ok(lease) => Some(lease),
                    Err(e) => {
                        let mut failure = AttemptFailure::from(e);
                        failure.no_renderer = true;
                        return Err(failure);
                    }
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AttemptFailure::cancelled("cancelled waiting for dispatch"));
            }
            _ = self.gate.ready() => {}
        }

        request.begin_attempt();
        self.stats.record_attempt(request.strategy);
        let timeout = self.config.page_timeout();

        debug!(
            id = %request.identifier,
            url = %request.url,
            strategy = %request.strategy,
            attempt = request.attempt,
            "Dispatching"
        );

        let html = match lease {
            None => {
                let fetched = tokio::time::timeout(timeout, self.fetcher.fetch(&request.url, timeout)).await;
                match fetched {
                    Ok(result) => result?,
                    Err(_) => return Err(Self::timed_out(timeout)),
                }
            }
            Some(lease) => {
                let rendered =
                    tokio::time::timeout(timeout + RENDER_GRACE, lease.render(&request.url, timeout)).await;
                match rendered {
                    Ok(result) => result?,
                    Err(_) => return Err(Self::timed_out(timeout)),
                }
            }
        };

        let parsed = self.parser.parse(&html, page_url)?;
        let missing = parsed.missing(&self.config.required_fields);
        if !missing.is_empty() {
            return Err(AttemptFailure::new(
                ErrorKind::ParseInsufficient,
                format!("missing required fields: {missing:?}"),
            ));
        }

        Ok(parsed)
    }

    fn timed_out(timeout: Duration) -> AttemptFailure {
        AttemptFailure::new(
            ErrorKind::Transient,
            format!("attempt timed out after {timeout:?}"),
        )
    }

    fn failed(
        raw: &str,
        request: &ExtractionRequest,
        kind: ErrorKind,
        message: &str,
    ) -> ExtractionOutcome {
        ExtractionOutcome::Failure(ExtractionFailure::new(
            raw,
            kind,
            request.total_attempts,
            message,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TenderPageParser;
    use crate::testing::{tender_html, MockFetcher, MockLauncher, MockResponse};

    fn fast_config() -> EngineConfig {
        EngineConfig::default()
            .with_request_delay(Duration::ZERO)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    fn engine(
        config: EngineConfig,
        fetcher: MockFetcher,
    ) -> ExtractionEngine<MockFetcher, MockLauncher, TenderPageParser> {
        ExtractionEngine::new(config, fetcher, MockLauncher::new(), TenderPageParser::new()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = ExtractionEngine::new(
            EngineConfig::default().with_max_concurrent(0),
            MockFetcher::new(),
            MockLauncher::new(),
            TenderPageParser::new(),
        );
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[tokio::test]
    async fn test_extract_one_success() {
        let fetcher = MockFetcher::new()
            .with_page("1234-567-L123", tender_html("Servicio de aseo", "Municipalidad", 3));
        let engine = engine(fast_config(), fetcher);

        let outcome = engine.extract_one("1234-567-L123").await.unwrap();
        let fields = outcome.as_success().unwrap();
        assert_eq!(fields.title, "Servicio de aseo");
        assert_eq!(fields.strategy, Strategy::Static);
        assert_eq!(engine.stats().static_attempts, 1);
    }

    #[tokio::test]
    async fn test_dedupe_reuses_first_outcome() {
        let fetcher = MockFetcher::new()
            .with_page("1-1-L1", tender_html("A", "B", 0));
        let engine = engine(fast_config().with_dedupe(), fetcher.clone());

        let report = engine
            .extract_many(&["1-1-L1", " 1-1-L1", "1-1-L1"])
            .await
            .unwrap();

        assert_eq!(report.len(), 3);
        assert_eq!(report.success_count(), 3);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_concurrency_override_is_config_error() {
        let engine = engine(fast_config(), MockFetcher::new());
        let result = engine
            .extract_many_with(&["1-1-L1"], RunOptions::new().with_max_concurrent(0))
            .await;
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[tokio::test]
    async fn test_lifecycle_error_after_shutdown() {
        let engine = engine(fast_config(), MockFetcher::new());
        engine.shutdown().await.unwrap();

        assert!(matches!(
            engine.extract_one("1-1-L1").await,
            Err(EngineError::Lifecycle(_))
        ));
        assert!(matches!(
            engine.extract_many(&["1-1-L1"]).await,
            Err(EngineError::Lifecycle(_))
        ));
    }

    #[tokio::test]
    async fn test_fallback_counted_in_stats() {
        let fetcher = MockFetcher::new().respond("1-1-L1", [MockResponse::Html("<p>shell</p>".into())]);
        let launcher = MockLauncher::new();
        let engine = ExtractionEngine::new(
            fast_config(),
            fetcher,
            launcher.clone(),
            TenderPageParser::new(),
        )
        .unwrap();

        let outcome = engine.extract_one("1-1-L1").await.unwrap();
        assert_eq!(outcome.kind(), Some(ErrorKind::ParseInsufficient));

        let stats = engine.stats();
        assert_eq!(stats.static_attempts, 1);
        assert_eq!(stats.rendered_attempts, 1);
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(launcher.renderer().call_count(), 1);
    }
}
