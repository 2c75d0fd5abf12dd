//! Stable Diffusion WebUI backend (`/sdapi/v1/txt2img`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::ImageBackend;
use crate::config::ImageConfig;

const TXT2IMG_PATH: &str = "/sdapi/v1/txt2img";

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Calls a Stable Diffusion WebUI instance.
pub struct StableDiffusionBackend {
    endpoint: String,
    params: Map<String, Value>,
    negative_prompt: Option<String>,
    client: reqwest::Client,
}

impl StableDiffusionBackend {
    /// Backend for `base_url`; the txt2img path replaces any path in it.
    pub fn new(base_url: &str, params: Map<String, Value>, negative_prompt: Option<String>) -> Self {
        let endpoint = reqwest::Url::parse(base_url)
            .and_then(|url| url.join(TXT2IMG_PATH))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("{}{}", base_url.trim_end_matches('/'), TXT2IMG_PATH));
        Self {
            endpoint,
            params,
            negative_prompt: negative_prompt.filter(|p| !p.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    /// `None` when no WebUI URL is configured.
    pub fn from_config(config: &ImageConfig) -> Option<Self> {
        config
            .sdapi_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| Self::new(url, config.params.clone(), config.negative_prompt.clone()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Request body: configured params plus the prompt fields.
    pub fn request_body(&self, prompt: &str) -> Value {
        let mut body = self.params.clone();
        body.insert("prompt".into(), Value::String(prompt.to_string()));
        if let Some(negative) = &self.negative_prompt {
            body.insert("negative_prompt".into(), Value::String(negative.clone()));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl ImageBackend for StableDiffusionBackend {
    async fn generate(&self, prompt: &str) -> Option<String> {
        debug!(prompt, "Generating image");
        let response = match self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(prompt))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Failed to call SDAPI");
                return None;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            warn!(status = response.status().as_u16(), "SDAPI returned an error");
            return None;
        }

        match response.json::<Txt2ImgResponse>().await {
            Ok(body) => body.images.into_iter().next(),
            Err(e) => {
                error!(error = %e, "Failed to parse SDAPI response");
                None
            }
        }
    }
}
