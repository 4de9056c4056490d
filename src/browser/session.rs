//! Seams between the export pipeline and a concrete browser backend.
//!
//! The pipeline only talks to these traits; [`super::chromium`] implements
//! them over the DevTools protocol and tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::Result;
use crate::page::PageLayout;

/// Starts browser processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserInstance>>;
}

/// One running browser process shared by every export.
#[async_trait]
pub trait BrowserInstance: Send + Sync {
    /// Flips to `true` once the process has gone away.
    fn disconnected(&self) -> watch::Receiver<bool>;

    fn is_connected(&self) -> bool {
        !*self.disconnected().borrow()
    }

    /// Creates a browsing context isolated from every other session, with a
    /// single page inside it.
    async fn new_session(&self) -> Result<Box<dyn RenderSession>>;

    async fn close(&self) -> Result<()>;
}

/// Outcome of waiting for the images of a loaded page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageWaitReport {
    pub total: usize,
    pub loaded: usize,
    pub failed: usize,
    /// Images still pending when the per-image bound expired.
    pub timed_out: usize,
}

/// A page inside an isolated browsing context, owned by exactly one job.
#[async_trait]
pub trait RenderSession: Send + Sync {
    fn id(&self) -> &str;

    /// True once the page was closed, crashed or detached.
    fn is_closed(&self) -> bool;

    /// Replaces the page document. Does not wait for subresources.
    async fn load_markup(&self, html: &str) -> Result<()>;

    /// True when `document.readyState` is no longer `loading`.
    async fn dom_ready(&self) -> Result<bool>;

    /// Waits for every `<img>` of the document, each bounded by `per_image`.
    async fn wait_for_images(&self, per_image: Duration) -> Result<ImageWaitReport>;

    async fn print_pdf(&self, layout: &PageLayout) -> Result<Vec<u8>>;

    /// Closes the page, then its browsing context. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}
