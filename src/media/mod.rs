//! Media collaborators: photo download for multimodal turns and image
//! generation for `GENERATE_IMAGE` replies.

pub mod sdapi;

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::config::FetchConfig;
use crate::error::Result;

pub use sdapi::StableDiffusionBackend;

/// Downloads a platform file and returns it base64 encoded.
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    async fn download_base64(&self, url: &str) -> Result<String>;
}

/// Produces an image for a prompt.
///
/// `None` means no image could be produced; implementations log the cause.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Option<String>;
}

/// Plain HTTP GET downloader.
pub struct HttpImageDownloader {
    client: reqwest::Client,
}

impl HttpImageDownloader {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(Duration::from_secs(config.request_timeout_secs))
    }
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn download_base64(&self, url: &str) -> Result<String> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(STANDARD.encode(&bytes))
    }
}
