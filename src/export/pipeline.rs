//! The work one export job does once it holds a worker slot: build the
//! model, render markup, print it in the browser, assemble and store the PDF.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::job::{artifact_file_name, ExportJob};
use crate::assembler::{self, DocumentAssembler, SectionPdf};
use crate::browser::{BrowserManager, RenderSession};
use crate::config::{RenderMode, RenderSettings};
use crate::error::{BrowserFailure, ExportError, Result};
use crate::page::{Margins, Orientation, PageLayout, PageSize};
use crate::progress::{report, JobState, ProgressCallback};
use crate::render_model::{BuildOptions, ModelBuilder};
use crate::renderer::SectionRenderer;
use crate::sections::{self, SectionDescriptor, DOCUMENT_TEMPLATE};
use crate::template::TemplateRenderer;
use crate::types::{DocumentRecord, RenderModel};

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub path: PathBuf,
    pub size: u64,
    pub page_count: usize,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<String>,
    pub skipped: Vec<String>,
}

/// Markup of one section, ready for the browser.
struct PreparedSection {
    name: String,
    markup: String,
    layout: PageLayout,
}

pub struct ExportPipeline {
    builder: ModelBuilder,
    templates: Arc<dyn TemplateRenderer>,
    browser: Arc<BrowserManager>,
    renderer: SectionRenderer,
    assembler: DocumentAssembler,
    descriptors: Vec<SectionDescriptor>,
    page_size: PageSize,
    margins: Margins,
    header_footer: bool,
    artifact_dir: PathBuf,
}

fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ExportError::browser(
            BrowserFailure::Timeout,
            "export cancelled",
        ));
    }
    Ok(())
}

impl ExportPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        builder: ModelBuilder,
        templates: Arc<dyn TemplateRenderer>,
        browser: Arc<BrowserManager>,
        renderer: SectionRenderer,
        assembler: DocumentAssembler,
        descriptors: Vec<SectionDescriptor>,
        render: &RenderSettings,
        artifact_dir: PathBuf,
    ) -> Self {
        Self {
            builder,
            templates,
            browser,
            renderer,
            assembler,
            descriptors,
            page_size: render.page_size,
            margins: render.margins,
            header_footer: render.header_footer,
            artifact_dir,
        }
    }

    pub fn descriptors(&self) -> &[SectionDescriptor] {
        &self.descriptors
    }

    pub fn browser(&self) -> &Arc<BrowserManager> {
        &self.browser
    }

    /// Markup a job would print, as `(section, html)` pairs, without touching
    /// the browser.
    pub async fn preview(
        &self,
        record: &DocumentRecord,
        requester: &str,
        sections: Vec<String>,
        mode: RenderMode,
    ) -> Result<Vec<(String, String)>> {
        let options = BuildOptions {
            include_sections: Some(sections),
            ..BuildOptions::new(requester)
        };
        let model = self.builder.build(record, &options).await;
        Ok(self
            .prepare(&model, mode)?
            .into_iter()
            .map(|p| (p.name, p.markup))
            .collect())
    }

    fn layout(&self, orientation: Orientation, model: &RenderModel) -> PageLayout {
        let layout = PageLayout::new(self.page_size, orientation, self.margins);
        if self.header_footer {
            layout.with_running_header(&model.code, &model.version)
        } else {
            layout
        }
    }

    /// Renders markup for every section the job prints. Template problems
    /// surface here, before a browser session is opened.
    fn prepare(&self, model: &RenderModel, mode: RenderMode) -> Result<Vec<PreparedSection>> {
        let selected = sections::select(&self.descriptors, model)?;
        match mode {
            RenderMode::SingleDocument => Ok(vec![PreparedSection {
                name: selected
                    .iter()
                    .map(|d| d.name)
                    .collect::<Vec<_>>()
                    .join("+"),
                markup: self.templates.render(model, DOCUMENT_TEMPLATE)?,
                layout: self.layout(Orientation::Portrait, model),
            }]),
            RenderMode::MultiSection => selected
                .into_iter()
                .map(|d| {
                    Ok(PreparedSection {
                        name: d.name.to_string(),
                        markup: self.templates.render(model, d.template)?,
                        layout: self.layout(d.orientation, model),
                    })
                })
                .collect(),
        }
    }

    pub async fn run(
        &self,
        job: &ExportJob,
        record: &DocumentRecord,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> Result<PipelineOutput> {
        let started = Instant::now();
        report(progress, &job.id, JobState::Building);

        let generated_at = Utc::now();
        let options = BuildOptions {
            printed_by: job.requester.clone(),
            generated_at,
            include_sections: Some(job.sections.clone()),
        };
        let model = tokio::select! {
            _ = cancel.cancelled() => return Err(ExportError::browser(
                BrowserFailure::Timeout,
                "export cancelled",
            )),
            model = self.builder.build(record, &options) => model,
        };
        let prepared = self.prepare(&model, job.mode)?;
        drop(model);
        ensure_live(cancel)?;

        let session = self.browser.new_isolated_session().await?;
        let rendered = self
            .render_sections(session.as_ref(), &prepared, job, cancel, progress)
            .await;
        self.browser.close_session(session).await;
        let pdfs = rendered?;
        ensure_live(cancel)?;

        report(progress, &job.id, JobState::Assembling);
        let names: Vec<String> = match job.mode {
            RenderMode::SingleDocument => model_sections(&prepared),
            RenderMode::MultiSection => pdfs.iter().map(|p| p.name.clone()).collect(),
        };
        let (bytes, page_count, skipped) = match job.mode {
            RenderMode::SingleDocument => {
                let bytes = pdfs
                    .into_iter()
                    .next()
                    .map(|p| p.bytes)
                    .ok_or_else(|| ExportError::assembly("document produced no output"))?;
                let pages = assembler::page_count(&bytes)?;
                (bytes, pages, Vec::new())
            }
            RenderMode::MultiSection => {
                let doc = self.assembler.merge(pdfs).await?;
                (doc.bytes, doc.page_count, doc.skipped)
            }
        };
        ensure_live(cancel)?;

        let path = self.write_artifact(job, record, &bytes).await?;
        let sections = names
            .into_iter()
            .filter(|n| !skipped.contains(n))
            .collect();

        info!(
            job_id = %job.id,
            record_id = %job.record_id,
            cache_key = %job.key,
            pages = page_count,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "export generated"
        );
        Ok(PipelineOutput {
            path,
            size: bytes.len() as u64,
            page_count,
            generated_at,
            sections,
            skipped,
        })
    }

    /// Renders sections strictly in order; the assembler relies on it.
    async fn render_sections(
        &self,
        session: &dyn RenderSession,
        prepared: &[PreparedSection],
        job: &ExportJob,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> Result<Vec<SectionPdf>> {
        let total = prepared.len();
        let mut pdfs = Vec::with_capacity(total);
        for (index, section) in prepared.iter().enumerate() {
            ensure_live(cancel)?;
            report(
                progress,
                &job.id,
                JobState::Rendering {
                    index: index + 1,
                    total,
                    section: section.name.clone(),
                },
            );
            let bytes = self
                .renderer
                .render_section(session, &section.markup, &section.layout, cancel)
                .await?;
            debug!(job_id = %job.id, section = %section.name, bytes = bytes.len(), "section printed");
            pdfs.push(SectionPdf {
                name: section.name.clone(),
                bytes,
            });
        }
        Ok(pdfs)
    }

    /// Writes through a temporary file so readers never see a partial PDF.
    async fn write_artifact(
        &self,
        job: &ExportJob,
        record: &DocumentRecord,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.artifact_dir).await?;
        let path = self
            .artifact_dir
            .join(artifact_file_name(record, &job.variant));
        let tmp = path.with_extension(format!("pdf.{}.tmp", job.id));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(path)
    }
}

/// Section names folded into a single-document render.
fn model_sections(prepared: &[PreparedSection]) -> Vec<String> {
    prepared
        .iter()
        .flat_map(|p| p.name.split('+').map(str::to_string))
        .filter(|n| !n.is_empty())
        .collect()
}
