//! Advisory per-record export locks with automatic expiry.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{ExportError, Result};

#[derive(Debug, Clone)]
struct LockRecord {
    job_id: String,
    started_at: DateTime<Utc>,
    acquired: Instant,
}

/// At most one live lock per record id. A lock older than `expiry` counts as
/// abandoned and is taken over by the next acquirer.
#[derive(Debug)]
pub struct LockTable {
    locks: Arc<DashMap<String, LockRecord>>,
    expiry: Duration,
}

/// Held for the lifetime of a job; releases the lock on drop unless it was
/// taken over in the meantime.
#[derive(Debug)]
pub struct LockGuard {
    locks: Arc<DashMap<String, LockRecord>>,
    record_id: String,
    job_id: String,
}

impl LockTable {
    pub fn new(expiry: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            expiry,
        }
    }

    pub fn acquire(&self, record_id: &str, job_id: &str) -> Result<LockGuard> {
        let fresh = LockRecord {
            job_id: job_id.to_string(),
            started_at: Utc::now(),
            acquired: Instant::now(),
        };

        match self.locks.entry(record_id.to_string()) {
            Entry::Occupied(mut held) => {
                let current = held.get();
                if current.acquired.elapsed() < self.expiry {
                    return Err(ExportError::LockConflict {
                        record_id: record_id.to_string(),
                        job_id: current.job_id.clone(),
                        started_at: current.started_at,
                    });
                }
                warn!(
                    record_id,
                    stale_job = %current.job_id,
                    job_id,
                    "taking over expired export lock"
                );
                held.insert(fresh);
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
            }
        }

        debug!(record_id, job_id, "export lock acquired");
        Ok(LockGuard {
            locks: Arc::clone(&self.locks),
            record_id: record_id.to_string(),
            job_id: job_id.to_string(),
        })
    }

    /// Job currently holding a live lock on `record_id`.
    pub fn holder(&self, record_id: &str) -> Option<String> {
        self.locks
            .get(record_id)
            .filter(|l| l.acquired.elapsed() < self.expiry)
            .map(|l| l.job_id.clone())
    }

    pub fn active(&self) -> usize {
        self.locks
            .iter()
            .filter(|l| l.acquired.elapsed() < self.expiry)
            .count()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let released = self
            .locks
            .remove_if(&self.record_id, |_, held| held.job_id == self.job_id)
            .is_some();
        if released {
            debug!(record_id = %self.record_id, job_id = %self.job_id, "export lock released");
        }
    }
}
