//! Image acquisition and compression.
//!
//! Every reference resolves to an [`EncodedImage`]; failures never escape this
//! module and degrade to a placeholder graphic instead.

mod compress;
mod fetch;
mod source;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use image::ImageError;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::ImageSettings;

pub use compress::{compress, fit_within, is_vector, sniff_mime, CompressOptions, SVG_MIME};
pub use fetch::{FetchedImage, HttpFetcher, ImageFetcher};
pub use source::{classify, to_data_uri, ImageSource};

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="160" height="120" viewBox="0 0 160 120"><rect width="160" height="120" fill="#eeeeee" stroke="#bbbbbb"/><path d="M20 100 L60 55 L90 85 L110 65 L140 100 Z" fill="#cccccc"/><circle cx="115" cy="35" r="10" fill="#cccccc"/><text x="80" y="114" font-family="sans-serif" font-size="9" fill="#888888" text-anchor="middle">image unavailable</text></svg>"##;

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("Failed to decode image: {0}")]
    Load(#[from] ImageError),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),
    #[error("Fetch failed: {0}")]
    Fetch(String),
    #[error("Fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Compression task failed: {0}")]
    Task(String),
}

/// Compression parameters; part of the memoization key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageOptions {
    pub quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub compress: bool,
}

impl From<&ImageSettings> for ImageOptions {
    fn from(settings: &ImageSettings) -> Self {
        Self {
            quality: settings.quality,
            max_width: settings.max_width,
            max_height: settings.max_height,
            compress: settings.compress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
    pub data_uri: String,
    pub mime: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub placeholder: bool,
}

impl EncodedImage {
    pub fn placeholder() -> Self {
        Self {
            data_uri: to_data_uri(SVG_MIME, PLACEHOLDER_SVG.as_bytes()),
            mime: SVG_MIME.to_string(),
            width: Some(160),
            height: Some(120),
            placeholder: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    reference: String,
    options: ImageOptions,
}

pub struct ImageLoader {
    fetcher: Arc<dyn ImageFetcher>,
    storage_root: Option<PathBuf>,
    base_url: Option<Url>,
    load_timeout: Duration,
    cache: DashMap<CacheKey, EncodedImage>,
}

impl ImageLoader {
    pub fn new(settings: &ImageSettings, fetcher: Arc<dyn ImageFetcher>) -> Self {
        let base_url = settings.base_url.as_deref().and_then(|raw| {
            Url::parse(raw)
                .map_err(|e| warn!(base_url = raw, error = %e, "ignoring invalid image base URL"))
                .ok()
        });
        Self {
            fetcher,
            storage_root: settings.storage_root.clone(),
            base_url,
            load_timeout: settings.load_timeout,
            cache: DashMap::new(),
        }
    }

    /// Loader backed by a real HTTP client.
    pub fn from_settings(settings: &ImageSettings) -> Result<Self, ImageLoadError> {
        let fetcher = HttpFetcher::new(settings.load_timeout)?;
        Ok(Self::new(settings, Arc::new(fetcher)))
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Resolve and encode one reference. Never fails: problems are logged and
    /// yield [`EncodedImage::placeholder`].
    pub async fn resolve_and_compress(&self, reference: &str, options: ImageOptions) -> EncodedImage {
        let key = CacheKey {
            reference: reference.to_string(),
            options,
        };
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        match self.try_resolve(reference, options).await {
            Ok(image) => {
                self.cache.insert(key, image.clone());
                image
            }
            Err(err) => {
                warn!(reference = %short(reference), error = %err, "image degraded to placeholder");
                EncodedImage::placeholder()
            }
        }
    }

    /// Resolve many references with at most `max_parallel` in flight.
    /// Output order matches input order.
    pub async fn resolve_many(
        &self,
        references: &[String],
        options: ImageOptions,
        max_parallel: usize,
    ) -> Vec<EncodedImage> {
        let pending: Vec<_> = references
            .iter()
            .map(|reference| self.resolve_and_compress(reference, options))
            .collect();
        stream::iter(pending)
            .buffered(max_parallel.max(1))
            .collect()
            .await
    }

    async fn try_resolve(
        &self,
        reference: &str,
        options: ImageOptions,
    ) -> Result<EncodedImage, ImageLoadError> {
        let fetched = self.acquire(reference).await?;

        if !options.compress {
            let mime = sniff_mime(&fetched.bytes, fetched.content_type.as_deref());
            return Ok(EncodedImage {
                data_uri: to_data_uri(&mime, &fetched.bytes),
                mime,
                width: None,
                height: None,
                placeholder: false,
            });
        }

        let opts = CompressOptions {
            quality: options.quality,
            max_width: options.max_width,
            max_height: options.max_height,
        };
        let task = tokio::task::spawn_blocking(move || {
            compress(&fetched.bytes, fetched.content_type.as_deref(), opts)
        });
        let compressed = tokio::time::timeout(self.load_timeout, task)
            .await
            .map_err(|_| ImageLoadError::Timeout("compression".into()))?
            .map_err(|e| ImageLoadError::Task(e.to_string()))??;

        Ok(EncodedImage {
            data_uri: to_data_uri(&compressed.mime, &compressed.bytes),
            mime: compressed.mime,
            width: compressed.width,
            height: compressed.height,
            placeholder: false,
        })
    }

    /// Inline data, then absolute URL, then local file, then the local path
    /// joined onto the base URL.
    async fn acquire(&self, reference: &str) -> Result<FetchedImage, ImageLoadError> {
        match classify(reference)? {
            ImageSource::Inline { mime, bytes } => Ok(FetchedImage {
                bytes,
                content_type: Some(mime),
            }),
            ImageSource::Remote(url) => self.fetch_with_timeout(&url).await,
            ImageSource::Local(path) => {
                let local_err = match self.read_local(&path).await {
                    Ok(bytes) => {
                        return Ok(FetchedImage {
                            bytes,
                            content_type: None,
                        })
                    }
                    Err(err) => err,
                };
                debug!(path = %path, error = %local_err, "local image read failed");

                match self.relative_url(&path) {
                    Some(url) => self.fetch_with_timeout(&url).await,
                    None => Err(local_err),
                }
            }
        }
    }

    async fn fetch_with_timeout(&self, url: &Url) -> Result<FetchedImage, ImageLoadError> {
        tokio::time::timeout(self.load_timeout, self.fetcher.fetch(url))
            .await
            .map_err(|_| ImageLoadError::Timeout(format!("fetching {url}")))?
    }

    async fn read_local(&self, raw: &str) -> Result<Vec<u8>, ImageLoadError> {
        let relative = Path::new(raw);
        let path = match &self.storage_root {
            Some(root) if relative.is_relative() => {
                if relative
                    .components()
                    .any(|c| matches!(c, Component::ParentDir))
                {
                    return Err(ImageLoadError::InvalidReference(format!(
                        "path escapes storage root: {raw}"
                    )));
                }
                root.join(relative)
            }
            _ => relative.to_path_buf(),
        };

        if !path.is_file() {
            return Err(ImageLoadError::NotFound(path.display().to_string()));
        }
        tokio::time::timeout(self.load_timeout, tokio::fs::read(&path))
            .await
            .map_err(|_| ImageLoadError::Timeout(format!("reading {}", path.display())))?
            .map_err(ImageLoadError::from)
    }

    fn relative_url(&self, path: &str) -> Option<Url> {
        let base = self.base_url.as_ref()?;
        base.join(path.trim_start_matches('/')).ok()
    }
}

fn short(reference: &str) -> String {
    const MAX: usize = 96;
    if reference.len() <= MAX {
        return reference.to_string();
    }
    let mut end = MAX;
    while !reference.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &reference[..end])
}
