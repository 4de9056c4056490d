//! DevTools-protocol backend built on `chromiumoxide`.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::inspector::{
    EnableParams as InspectorEnableParams, EventDetached, EventTargetCrashed,
};
use chromiumoxide::cdp::browser_protocol::page::{PrintToPdfParams, SetDocumentContentParams};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, EventExceptionThrown};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::scripts::{image_wait_script, is_target_gone, READY_STATE_SCRIPT};
use super::session::{BrowserInstance, BrowserLauncher, ImageWaitReport, RenderSession};
use crate::config::BrowserSettings;
use crate::error::{BrowserFailure, ExportError, Result};
use crate::page::{Orientation, PageLayout};

/// Chrome refuses an empty header/footer template and prints its default one.
const BLANK_TEMPLATE: &str = "<span></span>";

fn map_cdp_error(err: &CdpError, step: &str) -> ExportError {
    let message = err.to_string();
    if is_target_gone(&message) {
        return ExportError::page_closed(step);
    }
    if message.to_ascii_lowercase().contains("timeout") {
        return ExportError::browser(
            BrowserFailure::Timeout,
            format!("{step} timed out: {message}"),
        );
    }
    ExportError::browser(BrowserFailure::Protocol, format!("{step}: {message}"))
}

/// Launches a local Chromium.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .launch_timeout(self.settings.launch_timeout)
            .args(self.settings.args.clone());
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.settings.executable_path {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| ExportError::browser(BrowserFailure::Launch, e))
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserInstance>> {
        let config = self.config()?;
        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            ExportError::browser(
                BrowserFailure::Launch,
                format!("failed to start Chromium: {e}"),
            )
        })?;

        let (tx, rx) = watch::channel(false);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "devtools handler error");
                }
            }
            tx.send_replace(true);
        });

        Ok(Arc::new(ChromiumInstance {
            browser: Arc::new(browser),
            disconnected: rx,
            handler_task,
            sessions: AtomicU64::new(0),
        }))
    }
}

struct ChromiumInstance {
    browser: Arc<Browser>,
    disconnected: watch::Receiver<bool>,
    handler_task: JoinHandle<()>,
    sessions: AtomicU64,
}

impl Drop for ChromiumInstance {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

impl ChromiumInstance {
    async fn dispose_context(&self, context_id: BrowserContextId) {
        if let Err(err) = self
            .browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
        {
            debug!(error = %err, "dispose of unused browser context failed");
        }
    }
}

#[async_trait]
impl BrowserInstance for ChromiumInstance {
    fn disconnected(&self) -> watch::Receiver<bool> {
        self.disconnected.clone()
    }

    async fn new_session(&self) -> Result<Box<dyn RenderSession>> {
        let context_id = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| map_cdp_error(&e, "creating browser context"))?
            .result
            .browser_context_id;

        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(|e| ExportError::browser(BrowserFailure::Protocol, e))?;

        let page = match self.browser.new_page(params).await {
            Ok(page) => page,
            Err(err) => {
                self.dispose_context(context_id).await;
                return Err(map_cdp_error(&err, "opening page"));
            }
        };

        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("session-{n}");
        let closed = Arc::new(AtomicBool::new(false));
        let listeners = attach_diagnostics(&id, &page, &closed).await;

        Ok(Box::new(ChromiumSession {
            id,
            page,
            context_id,
            browser: Arc::clone(&self.browser),
            closed,
            released: AtomicBool::new(false),
            listeners,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.browser
            .execute(CloseParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_cdp_error(&e, "closing browser"))
    }
}

/// Crash, detach and uncaught-exception listeners. Crash and detach mark the
/// session closed so the renderer stops before its next step.
async fn attach_diagnostics(
    session: &str,
    page: &Page,
    closed: &Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    let mut listeners = Vec::new();

    if let Err(err) = page.execute(InspectorEnableParams::default()).await {
        debug!(session, error = %err, "inspector domain unavailable");
    }

    if let Ok(mut crashes) = page.event_listener::<EventTargetCrashed>().await {
        let closed = Arc::clone(closed);
        let session = session.to_string();
        listeners.push(tokio::spawn(async move {
            if crashes.next().await.is_some() {
                closed.store(true, Ordering::SeqCst);
                warn!(session = %session, "page crashed");
            }
        }));
    }

    if let Ok(mut detaches) = page.event_listener::<EventDetached>().await {
        let closed = Arc::clone(closed);
        let session = session.to_string();
        listeners.push(tokio::spawn(async move {
            if let Some(event) = detaches.next().await {
                closed.store(true, Ordering::SeqCst);
                warn!(session = %session, reason = %event.reason, "page detached");
            }
        }));
    }

    if let Ok(mut exceptions) = page.event_listener::<EventExceptionThrown>().await {
        let session = session.to_string();
        listeners.push(tokio::spawn(async move {
            while let Some(event) = exceptions.next().await {
                warn!(
                    session = %session,
                    error = %event.exception_details.text,
                    "uncaught page exception"
                );
            }
        }));
    }

    listeners
}

struct ChromiumSession {
    id: String,
    page: Page,
    context_id: BrowserContextId,
    browser: Arc<Browser>,
    closed: Arc<AtomicBool>,
    released: AtomicBool,
    listeners: Vec<JoinHandle<()>>,
}

impl ChromiumSession {
    async fn evaluate<T: DeserializeOwned>(&self, expression: &str, step: &str) -> Result<T> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| ExportError::browser(BrowserFailure::Protocol, e))?;
        let result = self
            .page
            .evaluate(params)
            .await
            .map_err(|e| map_cdp_error(&e, step))?;
        result.into_value::<T>().map_err(|e| {
            ExportError::browser(
                BrowserFailure::Protocol,
                format!("{step}: unexpected script result: {e}"),
            )
        })
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.released.load(Ordering::SeqCst)
    }

    async fn load_markup(&self, html: &str) -> Result<()> {
        let frame_id = self
            .page
            .mainframe()
            .await
            .map_err(|e| map_cdp_error(&e, "loading markup"))?
            .ok_or_else(|| ExportError::page_closed("loading markup"))?;
        self.page
            .execute(SetDocumentContentParams::new(frame_id, html))
            .await
            .map(|_| ())
            .map_err(|e| map_cdp_error(&e, "loading markup"))
    }

    async fn dom_ready(&self) -> Result<bool> {
        let state: String = self.evaluate(READY_STATE_SCRIPT, "probing readyState").await?;
        Ok(state != "loading")
    }

    async fn wait_for_images(&self, per_image: Duration) -> Result<ImageWaitReport> {
        self.evaluate(&image_wait_script(per_image), "waiting for images")
            .await
    }

    async fn print_pdf(&self, layout: &PageLayout) -> Result<Vec<u8>> {
        let (paper_width, paper_height) = layout.size.inches(Orientation::Portrait);
        let (top, right, bottom, left) = layout.margins.inches();
        let params = PrintToPdfParams {
            landscape: Some(layout.orientation == Orientation::Landscape),
            display_header_footer: Some(layout.has_header_footer()),
            print_background: Some(layout.print_background),
            paper_width: Some(paper_width),
            paper_height: Some(paper_height),
            margin_top: Some(top),
            margin_right: Some(right),
            margin_bottom: Some(bottom),
            margin_left: Some(left),
            header_template: Some(
                layout
                    .header_template
                    .clone()
                    .unwrap_or_else(|| BLANK_TEMPLATE.to_string()),
            ),
            footer_template: Some(
                layout
                    .footer_template
                    .clone()
                    .unwrap_or_else(|| BLANK_TEMPLATE.to_string()),
            ),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };
        self.page
            .pdf(params)
            .await
            .map_err(|e| map_cdp_error(&e, "printing PDF"))
    }

    async fn close(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for listener in &self.listeners {
            listener.abort();
        }

        let mut first_error = None;
        if let Err(err) = self.page.clone().close().await {
            let err = map_cdp_error(&err, "closing page");
            if !err.is_page_closed() {
                first_error = Some(err);
            }
        }
        if let Err(err) = self
            .browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
        {
            let err = map_cdp_error(&err, "disposing browser context");
            if !err.is_page_closed() && first_error.is_none() {
                first_error = Some(err);
            }
        }
        self.closed.store(true, Ordering::SeqCst);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_builds_config_from_settings() {
        let launcher = ChromiumLauncher::new(BrowserSettings {
            executable_path: Some("/opt/chrome/chrome".into()),
            args: vec!["--no-sandbox".into()],
            ..BrowserSettings::default()
        });
        assert!(launcher.config().is_ok());
    }
}
