//! Turns one section's markup into PDF bytes inside a render session.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::browser::{RenderSession, READY_POLL_INTERVAL};
use crate::config::RenderSettings;
use crate::error::{BrowserFailure, ExportError, Result};
use crate::page::PageLayout;

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTimeouts {
    pub content_load: Duration,
    pub pdf: Duration,
    pub image_per_image: Duration,
    pub image_total: Duration,
}

impl From<&RenderSettings> for RenderTimeouts {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            content_load: settings.content_load_timeout,
            pdf: settings.pdf_timeout,
            image_per_image: settings.image_wait_per_image,
            image_total: settings.image_wait_total,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SectionRenderer {
    timeouts: RenderTimeouts,
}

fn ensure_open(session: &dyn RenderSession, step: &str) -> Result<()> {
    if session.is_closed() {
        return Err(ExportError::page_closed(step));
    }
    Ok(())
}

/// Runs one browser step under a deadline, giving up early on cancellation.
async fn bounded<T>(
    step: &str,
    limit: Duration,
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ExportError::browser(
            BrowserFailure::Timeout,
            format!("{step} cancelled"),
        )),
        outcome = timeout(limit, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ExportError::browser(
                BrowserFailure::Timeout,
                format!("{step} exceeded {limit:?}"),
            )),
        },
    }
}

impl SectionRenderer {
    pub fn new(timeouts: RenderTimeouts) -> Self {
        Self { timeouts }
    }

    /// Loads `markup`, waits for the DOM and then for images, and prints the
    /// page with `layout`. The session is checked before every step.
    pub async fn render_section(
        &self,
        session: &dyn RenderSession,
        markup: &str,
        layout: &PageLayout,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let started = Instant::now();

        ensure_open(session, "loading markup")?;
        bounded(
            "loading markup",
            self.timeouts.content_load,
            cancel,
            session.load_markup(markup),
        )
        .await?;

        ensure_open(session, "waiting for the DOM")?;
        bounded(
            "waiting for the DOM",
            self.timeouts.content_load,
            cancel,
            wait_dom_ready(session),
        )
        .await?;

        ensure_open(session, "waiting for images")?;
        self.wait_for_images(session, cancel).await?;

        ensure_open(session, "printing PDF")?;
        let bytes = bounded(
            "printing PDF",
            self.timeouts.pdf,
            cancel,
            session.print_pdf(layout),
        )
        .await?;

        if !bytes.starts_with(PDF_MAGIC) {
            return Err(ExportError::browser(
                BrowserFailure::Protocol,
                format!("print step returned {} bytes that are not a PDF", bytes.len()),
            ));
        }

        debug!(
            session = session.id(),
            orientation = %layout.orientation,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "section rendered"
        );
        Ok(bytes)
    }

    /// Image loading is best effort: a slow or broken image never fails the
    /// section, a closed page does.
    async fn wait_for_images(
        &self,
        session: &dyn RenderSession,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let outcome = bounded(
            "waiting for images",
            self.timeouts.image_total,
            cancel,
            session.wait_for_images(self.timeouts.image_per_image),
        )
        .await;

        match outcome {
            Ok(report) => {
                if report.failed > 0 || report.timed_out > 0 {
                    warn!(
                        session = session.id(),
                        total = report.total,
                        failed = report.failed,
                        timed_out = report.timed_out,
                        "some images did not load before printing"
                    );
                }
                Ok(())
            }
            Err(err) if err.is_page_closed() || cancel.is_cancelled() => Err(err),
            Err(err) => {
                warn!(session = session.id(), error = %err, "image wait abandoned");
                Ok(())
            }
        }
    }
}

async fn wait_dom_ready(session: &dyn RenderSession) -> Result<()> {
    loop {
        if session.dom_ready().await? {
            return Ok(());
        }
        if session.is_closed() {
            return Err(ExportError::page_closed("waiting for the DOM"));
        }
        sleep(READY_POLL_INTERVAL).await;
    }
}
