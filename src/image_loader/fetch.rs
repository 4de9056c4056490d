use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use url::Url;

use super::ImageLoadError;

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Network access for image references. Swappable so tests never touch
/// the network.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedImage, ImageLoadError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ImageLoadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tpx/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ImageLoadError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedImage, ImageLoadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ImageLoadError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageLoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageLoadError::Fetch(e.to_string()))?;

        Ok(FetchedImage {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
