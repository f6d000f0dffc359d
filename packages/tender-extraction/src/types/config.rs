//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::{EngineError, EngineResult};
use crate::types::identifier::TenderIdentifier;
use crate::types::tender::TenderField;

/// Public procurement portal.
pub const DEFAULT_BASE_URL: &str = "https://www.mercadopublico.cl";

/// Path of the tender detail page, relative to the base URL.
pub const TENDER_DETAIL_PATH: &str = "/Procurement/Modules/RFB/DetailsAcquisition.aspx";

/// Configuration for one extraction engine.
///
/// Immutable once handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum identifiers in flight at once.
    ///
    /// Default: 3.
    pub max_concurrent: usize,

    /// Minimum spacing between the start of successive dispatches.
    ///
    /// Applies to every fetch and render attempt across all workers.
    /// Default: 0.5 seconds. Zero disables pacing.
    pub request_delay_seconds: f64,

    /// Timeout for a single fetch or render attempt.
    ///
    /// Default: 10 seconds.
    pub page_timeout_seconds: f64,

    /// Retries per strategy after a transient failure.
    ///
    /// Default: 2 (so at most 3 attempts per strategy).
    pub max_retries: u32,

    /// Portal base URL; must be http(s) with a host.
    pub base_url: String,

    /// Backoff before retry N is `backoff_base × 2^(N−1)`.
    ///
    /// Default: 0.5 seconds.
    pub backoff_base_seconds: f64,

    /// Upper bound for a single backoff sleep.
    ///
    /// Default: 8 seconds.
    pub max_backoff_seconds: f64,

    /// Fields a static parse must yield to avoid falling back to rendering.
    ///
    /// Default: title and entity.
    pub required_fields: Vec<TenderField>,

    /// Fall back to the rendered strategy when static extraction falls short.
    ///
    /// Default: true.
    pub render_fallback: bool,

    /// Maximum concurrent browser sessions (capped by `max_concurrent`).
    ///
    /// Default: 1.
    pub render_sessions: usize,

    /// Reuse the first outcome for repeated identifiers instead of
    /// extracting each occurrence.
    ///
    /// Default: false.
    pub dedupe_identifiers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            request_delay_seconds: 0.5,
            page_timeout_seconds: 10.0,
            max_retries: 2,
            base_url: DEFAULT_BASE_URL.to_string(),
            backoff_base_seconds: 0.5,
            max_backoff_seconds: 8.0,
            required_fields: vec![TenderField::Title, TenderField::Entity],
            render_fallback: true,
            render_sessions: 1,
            dedupe_identifiers: false,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from `TENDER_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable values are config errors.
    pub fn from_env() -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("TENDER_MAX_CONCURRENT")? {
            config.max_concurrent = v;
        }
        if let Some(v) = env_parse::<f64>("TENDER_REQUEST_DELAY_SECONDS")? {
            config.request_delay_seconds = v;
        }
        if let Some(v) = env_parse::<f64>("TENDER_PAGE_TIMEOUT_SECONDS")? {
            config.page_timeout_seconds = v;
        }
        if let Some(v) = env_parse::<u32>("TENDER_MAX_RETRIES")? {
            config.max_retries = v;
        }
        if let Ok(v) = env::var("TENDER_BASE_URL") {
            config.base_url = v;
        }
        if let Some(v) = env_parse::<bool>("TENDER_RENDER_FALLBACK")? {
            config.render_fallback = v;
        }

        Ok(config)
    }

    /// Set the concurrency limit.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the inter-dispatch delay.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay_seconds = delay.as_secs_f64();
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Set retries per strategy.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the portal base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set backoff base and cap.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base_seconds = base.as_secs_f64();
        self.max_backoff_seconds = max.as_secs_f64();
        self
    }

    /// Set the fields a static parse must produce.
    pub fn with_required_fields(mut self, fields: impl IntoIterator<Item = TenderField>) -> Self {
        self.required_fields = fields.into_iter().collect();
        self
    }

    /// Disable the rendered fallback.
    pub fn without_render_fallback(mut self) -> Self {
        self.render_fallback = false;
        self
    }

    /// Set the browser session pool size.
    pub fn with_render_sessions(mut self, sessions: usize) -> Self {
        self.render_sessions = sessions;
        self
    }

    /// Collapse repeated identifiers onto one extraction.
    pub fn with_dedupe(mut self) -> Self {
        self.dedupe_identifiers = true;
        self
    }

    /// Check every option; called by the engine at construction.
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_concurrent == 0 {
            return Err(EngineError::config("max_concurrent must be > 0"));
        }
        if self.render_sessions == 0 {
            return Err(EngineError::config("render_sessions must be > 0"));
        }
        self.parsed_base_url()?;
        seconds("request_delay_seconds", self.request_delay_seconds)?;
        seconds("backoff_base_seconds", self.backoff_base_seconds)?;
        seconds("max_backoff_seconds", self.max_backoff_seconds)?;
        if seconds("page_timeout_seconds", self.page_timeout_seconds)?.is_zero() {
            return Err(EngineError::config("page_timeout_seconds must be > 0"));
        }
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_delay_seconds).unwrap_or_default()
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.page_timeout_seconds).unwrap_or_default()
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::try_from_secs_f64(self.backoff_base_seconds).unwrap_or_default()
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_backoff_seconds).unwrap_or_default()
    }

    /// Effective browser session pool size.
    pub fn effective_render_sessions(&self) -> usize {
        self.render_sessions.min(self.max_concurrent).max(1)
    }

    /// Detail page URL for an identifier.
    pub fn tender_url(&self, id: &TenderIdentifier) -> String {
        format!(
            "{}{}?idlicitacion={}",
            self.base_url.trim_end_matches('/'),
            TENDER_DETAIL_PATH,
            id
        )
    }

    fn parsed_base_url(&self) -> EngineResult<Url> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| EngineError::config(format!("base_url '{}': {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(EngineError::config(format!(
                "base_url '{}' must be an http(s) URL with a host",
                self.base_url
            )));
        }
        Ok(url)
    }
}

fn seconds(name: &str, value: f64) -> EngineResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| EngineError::config(format!("{} must be a finite, non-negative number", name)))
}

fn env_parse<T: FromStr>(key: &str) -> EngineResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| EngineError::config(format!("{}='{}': {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}
