//! Entry point of the pipeline: cache lookup, request coalescing, record
//! locking, queueing and the generation deadline.
//!
//! ```text
//! caller ─► cache hit? ─yes─► metadata (cached)
//!              │ no
//!              ▼
//!         in flight? ─yes─► wait for the leader's result
//!              │ no
//!              ▼
//!         record lock ─► worker pool ─► pipeline ─► cache write
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::{lookup_valid, CacheEntry, CacheStore, FileCacheStore, MemoryCacheStore};
use super::job::{self, ArtifactMetadata, CacheKey, ExportJob, ExportOptions, JobIdGenerator};
use super::lock::LockTable;
use super::pipeline::ExportPipeline;
use super::queue::{QueueStats, WorkerPool};
use crate::assembler::DocumentAssembler;
use crate::browser::{BrowserLauncher, BrowserManager, ChromiumLauncher};
use crate::config::{Config, RenderMode};
use crate::error::{ExportError, Result};
use crate::image_loader::{HttpFetcher, ImageFetcher, ImageLoader, ImageOptions};
use crate::progress::{report, JobState, ProgressCallback};
use crate::render_model::ModelBuilder;
use crate::renderer::{RenderTimeouts, SectionRenderer};
use crate::sections::{self, SectionDescriptor, DEFAULT_SECTIONS};
use crate::template::{HtmlTemplates, TemplateRenderer};
use crate::types::DocumentRecord;

type Shared = broadcast::Sender<Result<ArtifactMetadata>>;

/// Collaborators the coordinator is assembled from.
pub struct ExportServices {
    pub launcher: Arc<dyn BrowserLauncher>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub sections: Vec<SectionDescriptor>,
    /// Defaults to a file or memory store depending on configuration.
    pub cache: Option<Arc<dyn CacheStore>>,
    pub progress: Option<ProgressCallback>,
}

impl ExportServices {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            launcher,
            fetcher,
            templates: Arc::new(HtmlTemplates),
            sections: DEFAULT_SECTIONS.to_vec(),
            cache: None,
            progress: None,
        }
    }

    pub fn with_templates(mut self, templates: Arc<dyn TemplateRenderer>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_sections(mut self, sections: Vec<SectionDescriptor>) -> Self {
        self.sections = sections;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced: u64,
    pub lock_conflicts: u64,
    pub jobs_started: u64,
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
    pub queue: QueueStats,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced: AtomicU64,
    lock_conflicts: AtomicU64,
    jobs_started: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_timed_out: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Removes the in-flight entry on every exit path. Waiters of an entry that
/// is dropped without a result see a closed channel and re-enter admission.
struct InFlight<'a> {
    map: &'a DashMap<CacheKey, Shared>,
    key: CacheKey,
    armed: bool,
}

impl InFlight<'_> {
    fn complete(mut self, result: &Result<ArtifactMetadata>) {
        self.armed = false;
        if let Some((_, tx)) = self.map.remove(&self.key) {
            let waiters = tx.receiver_count();
            let _ = tx.send(result.clone());
            if waiters > 0 {
                debug!(cache_key = %self.key, waiters, "shared result with coalesced callers");
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.map.remove(&self.key);
        }
    }
}

pub struct ExportCoordinator {
    pipeline: Arc<ExportPipeline>,
    cache: Arc<dyn CacheStore>,
    locks: LockTable,
    pool: WorkerPool,
    in_flight: DashMap<CacheKey, Shared>,
    ids: JobIdGenerator,
    mode: RenderMode,
    generation_timeout: Duration,
    cache_ttl: Duration,
    progress: Option<ProgressCallback>,
    counters: Counters,
}

impl ExportCoordinator {
    /// Must be called inside a Tokio runtime. Nothing is launched until the
    /// first export needs the browser.
    pub fn new(config: &Config, services: ExportServices) -> Result<Self> {
        config.validate()?;

        let images = Arc::new(ImageLoader::new(&config.images, services.fetcher));
        let builder = ModelBuilder::new(
            images,
            ImageOptions::from(&config.images),
            config.images.max_parallel,
        );
        let browser = Arc::new(BrowserManager::new(
            services.launcher,
            config.browser.launch_timeout,
        ));
        let artifact_dir = config.export.artifact_dir.clone();
        let assembler =
            DocumentAssembler::new(config.export.assembly_policy, artifact_dir.join(".staging"));

        let cache: Arc<dyn CacheStore> = match services.cache {
            Some(cache) => cache,
            None if config.export.persistent_cache => {
                Arc::new(FileCacheStore::new(artifact_dir.join(".cache"))?)
            }
            None => Arc::new(MemoryCacheStore::new()),
        };

        let pipeline = ExportPipeline::new(
            builder,
            services.templates,
            browser,
            SectionRenderer::new(RenderTimeouts::from(&config.render)),
            assembler,
            services.sections,
            &config.render,
            artifact_dir,
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            cache,
            locks: LockTable::new(config.export.lock_expiry),
            pool: WorkerPool::new(config.export.concurrency),
            in_flight: DashMap::new(),
            ids: JobIdGenerator::default(),
            mode: config.export.mode,
            generation_timeout: config.export.generation_timeout,
            cache_ttl: config.export.cache_ttl,
            progress: services.progress,
            counters: Counters::default(),
        })
    }

    /// Coordinator backed by a local Chromium and an HTTP image client.
    pub fn from_config(config: &Config, progress: Option<ProgressCallback>) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.images.load_timeout)
            .map_err(|e| ExportError::Config(format!("image client: {e}")))?;
        let mut services = ExportServices::new(
            Arc::new(ChromiumLauncher::new(config.browser.clone())),
            Arc::new(fetcher),
        );
        services.progress = progress;
        Self::new(config, services)
    }

    /// Returns the artifact for `record`, generating it unless a valid cached
    /// one exists. Concurrent calls for the same key share one generation.
    pub async fn get_or_create_artifact(
        &self,
        record: Arc<DocumentRecord>,
        requester: &str,
        options: ExportOptions,
    ) -> Result<ArtifactMetadata> {
        record.check()?;
        let mode = options.mode.unwrap_or(self.mode);
        let sections =
            sections::resolve_filter(self.pipeline.descriptors(), options.sections.as_deref())?;
        let variant = job::variant(mode, &sections, options.sections.is_some());
        let key = CacheKey::new(&record, &variant);

        // A follower whose leader was dropped before finishing comes back
        // here and either hits the cache or takes over as leader.
        let mut first_pass = true;
        loop {
            if !options.force {
                if let Some(entry) = lookup_valid(self.cache.as_ref(), &key) {
                    bump(&self.counters.cache_hits);
                    debug!(cache_key = %key, record_id = %record.id, "cache hit");
                    return Ok(entry.to_metadata());
                }
            }
            if first_pass {
                bump(&self.counters.cache_misses);
            }

            let mut rx = match self.in_flight.entry(key.clone()) {
                Entry::Occupied(running) => running.get().subscribe(),
                Entry::Vacant(slot) => {
                    let (tx, _) = broadcast::channel(1);
                    slot.insert(tx);
                    break;
                }
            };

            if first_pass {
                bump(&self.counters.coalesced);
            }
            first_pass = false;
            debug!(cache_key = %key, "joining in-flight export");
            match rx.recv().await {
                Ok(result) => return result,
                Err(_) => debug!(cache_key = %key, "in-flight export abandoned, re-admitting"),
            }
        }

        let in_flight = InFlight {
            map: &self.in_flight,
            key: key.clone(),
            armed: true,
        };
        let job = ExportJob {
            id: self.ids.next_id(),
            record_id: record.id.clone(),
            requester: requester.to_string(),
            key,
            variant,
            mode,
            sections,
            force: options.force,
            created_at: chrono::Utc::now(),
        };
        let result = self.produce(job, record).await;
        in_flight.complete(&result);
        result
    }

    async fn produce(
        &self,
        job: ExportJob,
        record: Arc<DocumentRecord>,
    ) -> Result<ArtifactMetadata> {
        let progress = self.progress.as_ref();
        report(progress, &job.id, JobState::Queued);

        let lock = match self.locks.acquire(&job.record_id, &job.id) {
            Ok(lock) => lock,
            Err(err) => {
                bump(&self.counters.lock_conflicts);
                report(progress, &job.id, JobState::Failed(err.to_string()));
                return Err(err);
            }
        };
        report(progress, &job.id, JobState::Locked);
        bump(&self.counters.jobs_started);

        // Cancels the job if this future is dropped before it finishes.
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let pipeline = Arc::clone(&self.pipeline);
        let task_job = job.clone();
        let task_cancel = cancel.clone();
        let task_progress = self.progress.clone();
        let pending = self.pool.submit(async move {
            pipeline
                .run(&task_job, &record, &task_cancel, task_progress.as_ref())
                .await
        });

        let outcome = tokio::time::timeout(self.generation_timeout, pending).await;
        drop(lock);

        match outcome {
            Err(_) => {
                cancel.cancel();
                bump(&self.counters.jobs_timed_out);
                warn!(
                    job_id = %job.id,
                    record_id = %job.record_id,
                    timeout_ms = self.generation_timeout.as_millis() as u64,
                    "export timed out"
                );
                let err = ExportError::GenerationTimeout(self.generation_timeout);
                report(progress, &job.id, JobState::Failed(err.to_string()));
                Err(err)
            }
            Ok(Err(err)) => {
                bump(&self.counters.jobs_failed);
                warn!(job_id = %job.id, record_id = %job.record_id, error = %err, "export failed");
                report(progress, &job.id, JobState::Failed(err.to_string()));
                Err(err)
            }
            Ok(Ok(output)) => {
                let metadata = ArtifactMetadata {
                    record_id: job.record_id.clone(),
                    path: output.path,
                    size: output.size,
                    page_count: output.page_count,
                    generated_at: output.generated_at,
                    cached: false,
                    cache_key: job.key.clone(),
                    sections: output.sections,
                    skipped_sections: output.skipped,
                };
                if let Err(err) = self
                    .cache
                    .put(CacheEntry::from_metadata(&metadata, self.cache_ttl))
                {
                    warn!(cache_key = %job.key, error = %err, "failed to write cache entry");
                }
                info!(job_id = %job.id, cache_key = %job.key, "artifact cached");
                report(progress, &job.id, JobState::Cached);
                Ok(metadata)
            }
        }
    }

    /// Rendered markup per section, without a browser.
    pub async fn preview(
        &self,
        record: &DocumentRecord,
        requester: &str,
        sections: Option<&[String]>,
        mode: Option<RenderMode>,
    ) -> Result<Vec<(String, String)>> {
        record.check()?;
        let names = sections::resolve_filter(self.pipeline.descriptors(), sections)?;
        self.pipeline
            .preview(record, requester, names, mode.unwrap_or(self.mode))
            .await
    }

    pub fn stats(&self) -> ExportStats {
        let c = &self.counters;
        ExportStats {
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            lock_conflicts: c.lock_conflicts.load(Ordering::Relaxed),
            jobs_started: c.jobs_started.load(Ordering::Relaxed),
            jobs_failed: c.jobs_failed.load(Ordering::Relaxed),
            jobs_timed_out: c.jobs_timed_out.load(Ordering::Relaxed),
            queue: self.pool.stats(),
        }
    }

    /// Job currently holding the lock on `record_id`, if any.
    pub fn lock_holder(&self, record_id: &str) -> Option<String> {
        self.locks.holder(record_id)
    }

    pub fn browser(&self) -> &Arc<BrowserManager> {
        self.pipeline.browser()
    }

    /// Closes the shared browser process.
    pub async fn shutdown(&self) {
        self.pipeline.browser().shutdown().await;
    }
}
