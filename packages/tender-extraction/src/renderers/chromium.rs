//! Chromium-based renderer using chromiumoxide.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RenderError, RenderResult};
use crate::traits::renderer::{RenderLauncher, Renderer};

/// Find the Chromium binary path.
///
/// Checks `TENDER_CHROMIUM_PATH`, then the usual names on `PATH`.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("TENDER_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    ["google-chrome", "chromium", "chromium-browser"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

/// Launches a headless Chromium on first fallback.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    headless: bool,
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self {
            executable: None,
            headless: true,
        }
    }

    /// Use a specific browser binary instead of searching for one.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Show the browser window (debugging).
    pub fn headed(mut self) -> Self {
        self.headless = false;
        self
    }
}

#[async_trait]
impl RenderLauncher for ChromiumLauncher {
    type Renderer = ChromiumRenderer;

    async fn launch(&self) -> RenderResult<ChromiumRenderer> {
        let chrome_path = self
            .executable
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| RenderError::Launch("Chromium not found".to_string()))?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--window-size=1920,1080");
        if self.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| RenderError::Launch(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });

        info!("Browser session initialized");
        Ok(ChromiumRenderer {
            browser: Mutex::new(browser),
            handler_task,
        })
    }

    fn name(&self) -> &str {
        "chromium"
    }
}

/// A running headless Chromium. Each render opens and closes its own tab.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
}

/// A tab that is closed even if the render holding it is dropped.
struct OpenPage {
    page: Page,
    closed: bool,
}

impl OpenPage {
    async fn close(mut self, url: &str) {
        self.closed = true;
        if let Err(e) = self.page.clone().close().await {
            warn!(url = %url, error = %e, "Failed to close page");
        }
    }
}

impl Drop for OpenPage {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let page = self.page.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    debug!(error = %e, "Failed to close abandoned page");
                }
            });
        }
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> RenderResult<String> {
        let page = {
            let browser = self.browser.lock().await;
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| RenderError::Browser(format!("failed to create page: {e}")))?;
            OpenPage { page, closed: false }
        };

        let result = tokio::time::timeout(timeout, async {
            let page = &page.page;
            page.goto(url)
                .await
                .map_err(|e| RenderError::Browser(format!("navigation failed: {e}")))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| RenderError::Browser(format!("navigation failed: {e}")))?;
            page.content()
                .await
                .map_err(|e| RenderError::Browser(format!("failed to get HTML: {e}")))
        })
        .await;

        page.close(url).await;

        match result {
            Ok(html) => html,
            Err(_) => Err(RenderError::Timeout {
                url: url.to_string(),
            }),
        }
    }

    async fn close(&self) -> RenderResult<()> {
        let mut browser = self.browser.lock().await;
        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| RenderError::Browser(format!("failed to close browser: {e}")));
        self.handler_task.abort();
        info!("Browser session terminated");
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_render_data_url() {
        let renderer = ChromiumLauncher::new().launch().await.unwrap();
        let html = renderer
            .render(
                "data:text/html,<h1 id='lblNombreLicitacion'>Hola</h1>",
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        assert!(html.contains("lblNombreLicitacion"));
        renderer.close().await.unwrap();
    }
}
