//! Export orchestration: caching, coalescing, locking and the bounded job
//! queue around the per-job pipeline.
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
//! let record = Arc::new(DocumentRecord::from_path("record.json".as_ref())?);
//! let artifact = coordinator
//!     .get_or_create_artifact(record, "jane", ExportOptions::default())
//!     .await?;
//! println!("{} ({} pages)", artifact.path.display(), artifact.page_count);
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod cache;
mod coordinator;
mod job;
mod lock;
mod pipeline;
mod queue;

pub use cache::{lookup_valid, CacheEntry, CacheStore, FileCacheStore, MemoryCacheStore};
pub use coordinator::{ExportCoordinator, ExportServices, ExportStats};
pub use job::{artifact_file_name, variant, ArtifactMetadata, CacheKey, ExportJob, ExportOptions};
pub use lock::{LockGuard, LockTable};
pub use pipeline::{ExportPipeline, PipelineOutput};
pub use queue::{QueueStats, WorkerPool};
