//! Bounded FIFO worker pool for export jobs.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::debug;

use crate::error::{ExportError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub capacity: usize,
    pub active: usize,
    pub queued: usize,
    /// Highest number of jobs that ever ran at the same time.
    pub peak: usize,
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    queued: AtomicUsize,
    peak: AtomicUsize,
}

/// Runs at most `capacity` jobs at once; the rest wait in submission order.
///
/// A single dispatcher task takes jobs off the queue one at a time and only
/// starts the next one once it holds a slot for it. Must be created inside a
/// Tokio runtime.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    capacity: usize,
    sender: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, mut receiver) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
        let permits = Arc::new(Semaphore::new(capacity));

        tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                tokio::spawn(async move {
                    task.await;
                    drop(permit);
                });
            }
            debug!("worker pool dispatcher stopped");
        });

        Self {
            capacity,
            sender,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Queues `job`. The returned future resolves to the job's result; dropping
    /// it does not stop the job.
    pub fn submit<F, T>(&self, job: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let counters = Arc::clone(&self.counters);
        counters.queued.fetch_add(1, Ordering::SeqCst);

        let task: BoxFuture<'static, ()> = Box::pin(async move {
            counters.queued.fetch_sub(1, Ordering::SeqCst);
            let running = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
            counters.peak.fetch_max(running, Ordering::SeqCst);
            let result = job.await;
            counters.active.fetch_sub(1, Ordering::SeqCst);
            let _ = tx.send(result);
        });

        if self.sender.send(task).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
        }

        async move {
            rx.await
                .unwrap_or_else(|_| Err(ExportError::Internal("export job was dropped".into())))
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            capacity: self.capacity,
            active: self.counters.active.load(Ordering::SeqCst),
            queued: self.counters.queued.load(Ordering::SeqCst),
            peak: self.counters.peak.load(Ordering::SeqCst),
        }
    }
}
