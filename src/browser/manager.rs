//! Supervised access to the shared browser process.
//!
//! `BrowserManager` owns at most one live [`BrowserInstance`]. It launches
//! lazily, relaunches after a disconnect, and hands out isolated sessions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::session::{BrowserInstance, BrowserLauncher, RenderSession};
use crate::error::{BrowserFailure, ExportError, Result};

/// Default bound for starting the browser process.
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

struct Slot {
    generation: u64,
    instance: Arc<dyn BrowserInstance>,
}

/// Lazily launched, self-healing handle to the browser process.
pub struct BrowserManager {
    launcher: Arc<dyn BrowserLauncher>,
    launch_timeout: Duration,
    slot: Arc<Mutex<Option<Slot>>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for BrowserManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserManager")
            .field("launch_timeout", &self.launch_timeout)
            .field("launches", &self.launches())
            .finish_non_exhaustive()
    }
}

impl BrowserManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, launch_timeout: Duration) -> Self {
        Self {
            launcher,
            launch_timeout,
            slot: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Number of processes launched so far.
    pub fn launches(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Returns the live instance, launching one if none exists or the
    /// previous one disconnected.
    pub async fn get_instance(&self) -> Result<Arc<dyn BrowserInstance>> {
        let mut slot = self.slot.lock().await;
        if let Some(current) = slot.as_ref() {
            if current.instance.is_connected() {
                return Ok(Arc::clone(&current.instance));
            }
            debug!(
                generation = current.generation,
                "browser disconnected, relaunching"
            );
            *slot = None;
        }

        let instance = match timeout(self.launch_timeout, self.launcher.launch()).await {
            Ok(Ok(instance)) => instance,
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(ExportError::browser(
                    BrowserFailure::Launch,
                    format!("browser did not start within {:?}", self.launch_timeout),
                ))
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "browser launched");
        self.watch_disconnect(generation, Arc::clone(&instance));
        *slot = Some(Slot {
            generation,
            instance: Arc::clone(&instance),
        });
        Ok(instance)
    }

    /// Clears the slot when this generation's process goes away. Spawned once
    /// per launched instance.
    fn watch_disconnect(&self, generation: u64, instance: Arc<dyn BrowserInstance>) {
        let slot = Arc::clone(&self.slot);
        let mut rx = instance.disconnected();
        drop(instance);
        tokio::spawn(async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
            let mut guard = slot.lock().await;
            if guard.as_ref().map(|s| s.generation) == Some(generation) {
                *guard = None;
                warn!(generation, "browser disconnected; next export relaunches it");
            }
        });
    }

    /// Opens a fresh isolated session on the shared browser.
    pub async fn new_isolated_session(&self) -> Result<Box<dyn RenderSession>> {
        let instance = self.get_instance().await?;
        match instance.new_session().await {
            Ok(session) => {
                debug!(session = session.id(), "isolated session opened");
                Ok(session)
            }
            Err(err) if !instance.is_connected() => Err(ExportError::browser(
                BrowserFailure::Disconnected,
                format!("browser went away while opening a session: {err}"),
            )),
            Err(err) => Err(err),
        }
    }

    /// Closes a session, consuming it. "Already closed" is not an error.
    pub async fn close_session(&self, session: Box<dyn RenderSession>) {
        let id = session.id().to_string();
        match session.close().await {
            Ok(()) => debug!(session = %id, "session closed"),
            Err(err) if err.is_page_closed() => {
                debug!(session = %id, "session was already closed")
            }
            Err(err) => warn!(session = %id, error = %err, "failed to close session"),
        }
    }

    /// Closes the current process, if any.
    pub async fn shutdown(&self) {
        let taken = self.slot.lock().await.take();
        if let Some(slot) = taken {
            if let Err(err) = slot.instance.close().await {
                warn!(generation = slot.generation, error = %err, "browser close failed");
            }
        }
    }
}
