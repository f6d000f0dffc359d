//! Renderer abstraction for the rendered extraction path.
//!
//! Rendering is split in two: a [`RenderLauncher`] starts the expensive
//! browser process, and the [`Renderer`] it returns renders pages. The
//! engine launches at most one renderer per lifetime, lazily, on the first
//! fallback, and closes it on shutdown.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RenderError, RenderResult};

/// A running browser that can render pages.
///
/// Must tolerate concurrent `render` calls up to the engine's session pool
/// size.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Navigate to `url`, wait for scripts to settle and return the DOM as HTML.
    async fn render(&self, url: &str, timeout: Duration) -> RenderResult<String>;

    /// Release the browser process. Called exactly once by the engine.
    async fn close(&self) -> RenderResult<()>;
}

/// Starts a [`Renderer`].
#[async_trait]
pub trait RenderLauncher: Send + Sync {
    type Renderer: Renderer + 'static;

    /// Launch a browser. Called at most once per engine lifetime.
    async fn launch(&self) -> RenderResult<Self::Renderer>;

    /// Get the launcher name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<L: RenderLauncher + ?Sized> RenderLauncher for Arc<L> {
    type Renderer = L::Renderer;

    async fn launch(&self) -> RenderResult<Self::Renderer> {
        (**self).launch().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Launcher used when no browser is available.
///
/// Static extraction still works; any fallback fails with
/// `RenderError::Unavailable`, classified as permanent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLauncher;

/// Renderer type of [`NoopLauncher`]; never constructed.
#[derive(Debug)]
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn render(&self, _url: &str, _timeout: Duration) -> RenderResult<String> {
        Err(RenderError::Unavailable)
    }

    async fn close(&self) -> RenderResult<()> {
        Ok(())
    }
}

#[async_trait]
impl RenderLauncher for NoopLauncher {
    type Renderer = NoopRenderer;

    async fn launch(&self) -> RenderResult<NoopRenderer> {
        Err(RenderError::Unavailable)
    }

    fn name(&self) -> &str {
        "noop"
    }
}
