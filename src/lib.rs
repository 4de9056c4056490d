//! Tech-pack Export (TPX) Library
//!
//! Turns product specification records into print-ready PDF documents:
//! records are projected into a render model, rendered to HTML per section,
//! printed by a shared headless Chromium and merged into one file. Artifacts
//! are cached by record version and modification time.
//!
//! # Module Overview
//!
//! - [`export`] - Coordinator: cache, request coalescing, record locks, job queue
//! - [`render_model`] - Record to render model projection (BOM, sizes, fit, swatches)
//! - [`image_loader`] - Image resolution, compression and data-URI inlining
//! - [`sections`] / [`template`] - Section descriptors and HTML templates
//! - [`browser`] / [`renderer`] - Browser lifecycle and per-section PDF printing
//! - [`assembler`] - Ordered merge of section PDFs
//! - [`config`] - Configuration file and environment support
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tpx_lib::{Config, DocumentRecord, ExportCoordinator, ExportOptions};
//!
//! # async fn example() -> tpx_lib::Result<()> {
//! let config = Config::load(None)?;
//! let coordinator = ExportCoordinator::from_config(&config, None)?;
//!
//! let record = Arc::new(DocumentRecord::from_path("record.json".as_ref())?);
//! let artifact = coordinator
//!     .get_or_create_artifact(record, "jane", ExportOptions::default())
//!     .await?;
//! assert!(artifact.size > 0);
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod browser;
pub mod config;
pub mod error;
pub mod export;
pub mod image_loader;
pub mod logging;
pub mod output;
pub mod page;
pub mod progress;
pub mod render_model;
pub mod renderer;
pub mod sections;
pub mod template;
pub mod types;

pub use assembler::{AssembledDocument, DocumentAssembler, SectionPdf};
pub use browser::{
    BrowserInstance, BrowserLauncher, BrowserManager, ChromiumLauncher, ImageWaitReport,
    RenderSession, DEFAULT_LAUNCH_TIMEOUT,
};
pub use config::{AssemblyPolicy, Config, RenderMode};
pub use error::{BrowserFailure, ErrorCode, ErrorPayload, ExportError, Result};
pub use export::{
    ArtifactMetadata, CacheKey, CacheStore, ExportCoordinator, ExportOptions, ExportServices,
    ExportStats, FileCacheStore, MemoryCacheStore,
};
pub use image_loader::{EncodedImage, HttpFetcher, ImageFetcher, ImageLoader, ImageOptions};
pub use output::{
    ErrorOutput, ExportOutput, PreviewOutput, PreviewSection, TpxOutput, TPX_OUTPUT_VERSION,
};
pub use page::{Margins, Orientation, PageLayout, PageSize};
pub use progress::{JobState, ProgressCallback};
pub use render_model::{BuildOptions, ModelBuilder};
pub use renderer::{RenderTimeouts, SectionRenderer};
pub use sections::{SectionDescriptor, DEFAULT_SECTIONS};
pub use template::{HtmlTemplates, TemplateRenderer};
pub use types::{DocumentRecord, RenderModel};
