//! Renderer implementations for the rendered extraction path.
//!
//! - `ChromiumLauncher` - headless Chromium (requires `chromium` feature)
//! - `NoopLauncher` - no browser; every fallback fails as permanent

#[cfg(feature = "chromium")]
mod chromium;

#[cfg(feature = "chromium")]
pub use chromium::{find_chromium, ChromiumLauncher, ChromiumRenderer};

pub use crate::traits::renderer::{NoopLauncher, NoopRenderer, RenderLauncher, Renderer};
