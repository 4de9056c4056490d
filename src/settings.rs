use std::path::{Path, PathBuf};
use std::time::Duration;

use tpx_lib::{Config, ExportError, RenderMode};

/// Tracks which CLI flags were explicitly provided vs. defaulted.
#[derive(Debug, Default)]
pub struct ExportFlagSources {
    pub timeout: bool,
    pub concurrency: bool,
}

impl ExportFlagSources {
    pub fn from_args(args: &[String]) -> Self {
        Self {
            timeout: flag_present(args, "--timeout"),
            concurrency: flag_present(args, "--concurrency"),
        }
    }
}

/// Checks if a flag was present in the command-line arguments.
pub fn flag_present(args: &[String], flag: &str) -> bool {
    args.iter()
        .any(|arg| arg == flag || arg.starts_with(&format!("{flag}=")))
}

/// Export flags that can override the config file.
#[derive(Debug, Clone, Default)]
pub struct ExportOverrides {
    pub mode: Option<RenderMode>,
    pub artifact_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

/// Merge CLI arguments into the config, preferring CLI when flags are present.
pub fn apply_export_overrides(
    config: &mut Config,
    overrides: ExportOverrides,
    flags: &ExportFlagSources,
) {
    if let Some(mode) = overrides.mode {
        config.export.mode = mode;
    }
    if let Some(dir) = overrides.artifact_dir {
        config.export.artifact_dir = dir;
    }
    if flags.timeout {
        config.export.generation_timeout = Duration::from_secs(overrides.timeout_secs);
    }
    if flags.concurrency {
        config.export.concurrency = overrides.concurrency;
    }
}

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/tpx/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, ExportError> {
    Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        ExportError::Config(format!("Failed to read config {}: {}", loc, e))
    })
}

/// Validate after CLI overrides so flag values are checked too.
pub fn validate_config(config: &Config, path: Option<&Path>) -> Result<(), ExportError> {
    config.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        ExportError::Config(prefix)
    })
}

/// Format effective config as a single-line string.
pub fn format_effective_config(config: &Config, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    format!(
        "Effective config [{source}]: mode={:?}, concurrency={}, timeouts: generation={}s, content={}s, pdf={}s, launch={}s, cache_ttl={}s, artifacts={}, images: quality={}, max={}x{}, parallel={}",
        config.export.mode,
        config.export.concurrency,
        config.export.generation_timeout.as_secs(),
        config.render.content_load_timeout.as_secs(),
        config.render.pdf_timeout.as_secs(),
        config.browser.launch_timeout.as_secs(),
        config.export.cache_ttl.as_secs(),
        config.export.artifact_dir.display(),
        config.images.quality,
        config.images.max_width,
        config.images.max_height,
        config.images.max_parallel,
    )
}

/// Verbose mode always logs at debug level for this crate; otherwise the
/// configured level is kept.
pub fn log_level(config: &Config, verbose: bool) -> String {
    if verbose {
        "tpx_lib=debug,tpx=debug,info".to_string()
    } else {
        config.logging.level.clone()
    }
}
