//! Lazily launched, shared browser with a fair session pool.
//!
//! The browser is launched by whichever worker first needs it; later
//! workers reuse it. Sessions are handed out in FIFO order through a
//! semaphore sized to the configured pool. A [`RenderLease`] returns its
//! session when dropped, on every exit path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use crate::error::{RenderError, RenderResult};
use crate::traits::renderer::{RenderLauncher, Renderer};

enum Slot<R> {
    /// Not launched yet
    Idle,
    Running(Arc<R>),
    /// Launch failed; later acquisitions fail fast with the same reason
    Failed(String),
    /// Released by `close`
    Closed,
}

/// Owner of the shared rendering resource.
pub struct RenderPool<L: RenderLauncher> {
    launcher: L,
    slot: Mutex<Slot<L::Renderer>>,
    sessions: Arc<Semaphore>,
    size: usize,
    launches: AtomicUsize,
}

/// Scoped access to the shared renderer.
pub struct RenderLease<R> {
    renderer: Arc<R>,
    _permit: OwnedSemaphorePermit,
}

impl<R: Renderer> RenderLease<R> {
    pub async fn render(&self, url: &str, timeout: Duration) -> RenderResult<String> {
        self.renderer.render(url, timeout).await
    }
}

impl<L: RenderLauncher> RenderPool<L> {
    /// Create a pool with `size` concurrent sessions. Nothing is launched yet.
    pub fn new(launcher: L, size: usize) -> Self {
        let size = size.max(1);
        Self {
            launcher,
            slot: Mutex::new(Slot::Idle),
            sessions: Arc::new(Semaphore::new(size)),
            size,
            launches: AtomicUsize::new(0),
        }
    }

    /// Number of times the launcher has been invoked (0 or 1).
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for a free session, launching the browser if needed.
    pub async fn acquire(&self) -> RenderResult<RenderLease<L::Renderer>> {
        let permit = Arc::clone(&self.sessions)
            .acquire_owned()
            .await
            .map_err(|_| RenderError::Unavailable)?;

        let mut slot = self.slot.lock().await;
        let renderer = match &*slot {
            Slot::Running(renderer) => Arc::clone(renderer),
            Slot::Failed(reason) => return Err(RenderError::Launch(reason.clone())),
            Slot::Closed => return Err(RenderError::Unavailable),
            Slot::Idle => {
                self.launches.fetch_add(1, Ordering::SeqCst);
                info!(launcher = self.launcher.name(), "Launching browser for rendered fallback");
                match self.launcher.launch().await {
                    Ok(renderer) => {
                        let renderer = Arc::new(renderer);
                        *slot = Slot::Running(Arc::clone(&renderer));
                        renderer
                    }
                    Err(e) => {
                        warn!(error = %e, "Browser launch failed");
                        *slot = Slot::Failed(e.to_string());
                        return Err(e);
                    }
                }
            }
        };

        Ok(RenderLease {
            renderer,
            _permit: permit,
        })
    }

    /// Release the browser. Waits for outstanding leases first.
    ///
    /// Returns `true` if a running browser was closed by this call; repeated
    /// calls are no-ops.
    pub async fn close(&self) -> RenderResult<bool> {
        // Drain every session so no render is in flight while closing.
        // A closed semaphore means an earlier call already released it.
        let drained = match self.sessions.acquire_many(self.size as u32).await {
            Ok(permits) => permits,
            Err(_) => return Ok(false),
        };
        self.sessions.close();
        drop(drained);

        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, Slot::Closed) {
            Slot::Running(renderer) => {
                renderer.close().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
