use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::page::{Margins, PageSize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserSettings,
    pub render: RenderSettings,
    pub images: ImageSettings,
    pub export: ExportSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    #[serde(with = "humantime_serde")]
    pub launch_timeout: Duration,
    pub executable_path: Option<PathBuf>,
    pub headless: bool,
    /// Extra command-line switches passed to the browser process.
    pub args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            launch_timeout: Duration::from_secs(30),
            executable_path: None,
            headless: true,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    #[serde(with = "humantime_serde")]
    pub content_load_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub pdf_timeout: Duration,
    /// Upper bound for a single in-page image to finish decoding.
    #[serde(with = "humantime_serde")]
    pub image_wait_per_image: Duration,
    /// Upper bound for all in-page images of one section.
    #[serde(with = "humantime_serde")]
    pub image_wait_total: Duration,
    pub page_size: PageSize,
    pub margins: Margins,
    pub header_footer: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            content_load_timeout: Duration::from_secs(30),
            pdf_timeout: Duration::from_secs(60),
            image_wait_per_image: Duration::from_secs(5),
            image_wait_total: Duration::from_secs(15),
            page_size: PageSize::A4,
            margins: Margins::default(),
            header_footer: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    #[serde(with = "humantime_serde")]
    pub load_timeout: Duration,
    pub max_parallel: usize,
    pub quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub compress: bool,
    /// Directory local relative references are resolved against.
    pub storage_root: Option<PathBuf>,
    /// Base URL used when a relative reference is not found on disk.
    pub base_url: Option<String>,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(10),
            max_parallel: 6,
            quality: 80,
            max_width: 1200,
            max_height: 1200,
            compress: true,
            storage_root: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    SingleDocument,
    MultiSection,
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "single-document" => Ok(RenderMode::SingleDocument),
            "multi" | "multi-section" => Ok(RenderMode::MultiSection),
            other => Err(format!("unknown render mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssemblyPolicy {
    /// Drop sections whose PDF cannot be merged; fail only if none survive.
    SkipFailed,
    FailFast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub concurrency: usize,
    #[serde(with = "humantime_serde")]
    pub generation_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub lock_expiry: Duration,
    pub artifact_dir: PathBuf,
    pub mode: RenderMode,
    pub assembly_policy: AssemblyPolicy,
    /// Persist cache entries next to the artifacts instead of in memory.
    pub persistent_cache: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            concurrency: 2,
            generation_timeout: Duration::from_secs(120),
            cache_ttl: Duration::from_secs(3600),
            lock_expiry: Duration::from_secs(300),
            artifact_dir: std::env::temp_dir().join("tpx-artifacts"),
            mode: RenderMode::MultiSection,
            assembly_policy: AssemblyPolicy::SkipFailed,
            persistent_cache: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Priority: explicit path > central config > defaults. Environment
    /// overrides are applied on top of whichever file was used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::central_config_path() {
                Some(central) if central.is_file() => Self::from_file(&central)?,
                _ => Self::default(),
            },
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// `$XDG_CONFIG_HOME/tpx/config.toml`, falling back to `~/.config/tpx/config.toml`.
    pub fn central_config_path() -> Option<PathBuf> {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(xdg).join("tpx").join("config.toml"));
        }
        std::env::var_os("HOME")
            .filter(|v| !v.is_empty())
            .map(|home| PathBuf::from(home).join(".config").join("tpx").join("config.toml"))
    }

    /// Apply `TPX_*` overrides. The lookup is injected so tests do not touch
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TPX_BROWSER_LAUNCH_TIMEOUT_MS") {
            self.browser.launch_timeout = parse_millis("TPX_BROWSER_LAUNCH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TPX_CONTENT_LOAD_TIMEOUT_MS") {
            self.render.content_load_timeout = parse_millis("TPX_CONTENT_LOAD_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TPX_PDF_TIMEOUT_MS") {
            self.render.pdf_timeout = parse_millis("TPX_PDF_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TPX_IMAGE_LOAD_TIMEOUT_MS") {
            self.images.load_timeout = parse_millis("TPX_IMAGE_LOAD_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TPX_GENERATION_TIMEOUT_MS") {
            self.export.generation_timeout = parse_millis("TPX_GENERATION_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TPX_CACHE_TTL_SECS") {
            self.export.cache_ttl = Duration::from_secs(parse_num("TPX_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("TPX_MAX_PARALLEL_IMAGES") {
            self.images.max_parallel = parse_num("TPX_MAX_PARALLEL_IMAGES", &v)?;
        }
        if let Some(v) = lookup("TPX_WORKER_CONCURRENCY") {
            self.export.concurrency = parse_num("TPX_WORKER_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("TPX_IMAGE_QUALITY") {
            self.images.quality = parse_num("TPX_IMAGE_QUALITY", &v)?;
        }
        if let Some(v) = lookup("TPX_IMAGE_MAX_WIDTH") {
            self.images.max_width = parse_num("TPX_IMAGE_MAX_WIDTH", &v)?;
        }
        if let Some(v) = lookup("TPX_IMAGE_MAX_HEIGHT") {
            self.images.max_height = parse_num("TPX_IMAGE_MAX_HEIGHT", &v)?;
        }
        if let Some(v) = lookup("TPX_ARTIFACT_DIR").filter(|v| !v.trim().is_empty()) {
            self.export.artifact_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TPX_CHROME_PATH").filter(|v| !v.trim().is_empty()) {
            self.browser.executable_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TPX_LOG").filter(|v| !v.trim().is_empty()) {
            self.logging.level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("browser.launch_timeout", self.browser.launch_timeout),
            ("render.content_load_timeout", self.render.content_load_timeout),
            ("render.pdf_timeout", self.render.pdf_timeout),
            ("render.image_wait_total", self.render.image_wait_total),
            ("images.load_timeout", self.images.load_timeout),
            ("export.generation_timeout", self.export.generation_timeout),
            ("export.lock_expiry", self.export.lock_expiry),
        ];
        for (key, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::invalid(key, "timeout must be greater than zero"));
            }
        }
        if self.export.concurrency == 0 {
            return Err(ConfigError::invalid(
                "export.concurrency",
                "worker concurrency must be at least 1",
            ));
        }
        if self.images.max_parallel == 0 {
            return Err(ConfigError::invalid(
                "images.max_parallel",
                "must be at least 1",
            ));
        }
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::invalid(
                "images.quality",
                format!("quality must be within 1..=100, got {}", self.images.quality),
            ));
        }
        if self.images.max_width == 0 || self.images.max_height == 0 {
            return Err(ConfigError::invalid(
                "images.max_width/max_height",
                "max dimensions must be positive",
            ));
        }
        Ok(())
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("expected a number, got '{value}'")))
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_num::<u64>(key, value).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn default_values_match_expected() {
        let cfg = Config::default();

        assert_eq!(cfg.browser.launch_timeout, Duration::from_secs(30));
        assert_eq!(cfg.export.concurrency, 2);
        assert_eq!(cfg.images.quality, 80);
        assert_eq!(cfg.export.mode, RenderMode::MultiSection);
        assert_eq!(cfg.export.assembly_policy, AssemblyPolicy::SkipFailed);
        assert!(cfg.images.compress);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn loads_partial_toml_with_humantime_durations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tpx.toml");
        fs::write(
            &path,
            r#"
[browser]
launch_timeout = "5s"

[export]
concurrency = 3
generation_timeout = "2m"
mode = "single-document"

[images]
quality = 65
"#,
        )
        .unwrap();

        let cfg = Config::from_file(&path).expect("parse config");
        assert_eq!(cfg.browser.launch_timeout, Duration::from_secs(5));
        assert_eq!(cfg.export.concurrency, 3);
        assert_eq!(cfg.export.generation_timeout, Duration::from_secs(120));
        assert_eq!(cfg.export.mode, RenderMode::SingleDocument);
        assert_eq!(cfg.images.quality, 65);
        // untouched sections keep defaults
        assert_eq!(cfg.render.pdf_timeout, Duration::from_secs(60));
    }

    #[test]
    fn env_overrides_take_effect() {
        let env: HashMap<&str, &str> = [
            ("TPX_WORKER_CONCURRENCY", "4"),
            ("TPX_PDF_TIMEOUT_MS", "1500"),
            ("TPX_CACHE_TTL_SECS", "60"),
            ("TPX_CHROME_PATH", "/opt/chrome"),
            ("TPX_ARTIFACT_DIR", "/tmp/out"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()))
            .expect("apply env");

        assert_eq!(cfg.export.concurrency, 4);
        assert_eq!(cfg.render.pdf_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.export.cache_ttl, Duration::from_secs(60));
        assert_eq!(cfg.browser.executable_path, Some(PathBuf::from("/opt/chrome")));
        assert_eq!(cfg.export.artifact_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn env_override_rejects_garbage() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_env(|k| (k == "TPX_IMAGE_QUALITY").then(|| "high".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("TPX_IMAGE_QUALITY"), "got: {err}");
    }

    #[test]
    fn validate_rejects_zero_concurrency_and_bad_quality() {
        let mut cfg = Config::default();
        cfg.export.concurrency = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("concurrency"));

        let mut cfg = Config::default();
        cfg.images.quality = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("quality"));

        let mut cfg = Config::default();
        cfg.render.pdf_timeout = Duration::ZERO;
        assert!(cfg.validate().unwrap_err().to_string().contains("pdf_timeout"));
    }

    #[test]
    fn render_mode_parses_short_names() {
        assert_eq!("single".parse::<RenderMode>(), Ok(RenderMode::SingleDocument));
        assert_eq!("Multi".parse::<RenderMode>(), Ok(RenderMode::MultiSection));
        assert!("both".parse::<RenderMode>().is_err());
    }
}
