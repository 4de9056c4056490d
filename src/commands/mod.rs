mod export;
mod preview;

pub use export::{run_export, ExportArgs};
pub use preview::run_preview;
