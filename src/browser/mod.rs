//! Headless browser access for PDF rendering.
//!
//! # Module Structure
//!
//! - [`session`] - traits the pipeline renders through
//! - [`manager`] - the supervised, lazily launched shared process
//! - [`chromium`] - the Chromium implementation of the traits
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tpx_lib::browser::{BrowserManager, ChromiumLauncher};
//! use tpx_lib::config::BrowserSettings;
//!
//! # async fn example() -> tpx_lib::Result<()> {
//! let settings = BrowserSettings::default();
//! let timeout = settings.launch_timeout;
//! let manager = BrowserManager::new(Arc::new(ChromiumLauncher::new(settings)), timeout);
//! let session = manager.new_isolated_session().await?;
//! session.load_markup("<h1>hello</h1>").await?;
//! manager.close_session(session).await;
//! # Ok(())
//! # }
//! ```

mod chromium;
mod manager;
mod scripts;
mod session;

pub use chromium::ChromiumLauncher;
pub use manager::{BrowserManager, DEFAULT_LAUNCH_TIMEOUT};
pub use scripts::READY_POLL_INTERVAL;
pub use session::{BrowserInstance, BrowserLauncher, ImageWaitReport, RenderSession};
