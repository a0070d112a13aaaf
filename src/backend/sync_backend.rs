//! Synchronous HTTP backend: one POST returns an image URL, one GET fetches it

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::traits::{GeneratedImage, ImageBackend};
use crate::config::SyncHttpConfig;
use crate::error::{AppError, Result};
use crate::retry::{retry, RetryPolicy};

/// Backend for APIs that answer the generation request directly
pub struct SyncHttpBackend {
    name: String,
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    retry_policy: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct ApiGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    image_size: &'a str,
    num_inference_steps: u32,
}

#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    images: Vec<ApiImageData>,
    #[serde(default)]
    timings: Option<ApiTimings>,
}

#[derive(Debug, Deserialize)]
struct ApiImageData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiTimings {
    #[serde(default)]
    inference: f64,
}

impl SyncHttpBackend {
    /// Create a new backend from configuration
    pub fn new(config: &SyncHttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: config.name.clone(),
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retry_policy: RetryPolicy::from_millis(config.max_retries, config.retry_delay_ms),
        })
    }

    fn unavailable(&self, reason: impl Into<String>) -> AppError {
        AppError::ProviderUnavailable {
            backend: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn download_failed(&self, reason: impl Into<String>) -> AppError {
        AppError::DownloadFailed {
            backend: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// One submit followed by one download
    async fn attempt(&self, prompt: &str, size: &str, steps: u32) -> Result<GeneratedImage> {
        let api_request = ApiGenerateRequest {
            model: &self.model,
            prompt,
            image_size: size,
            num_inference_steps: steps,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.unavailable(format!("request to {} timed out", self.endpoint))
                } else {
                    self.unavailable(format!("request to {} failed: {}", self.endpoint, e))
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(backend = %self.name, status = %status, body = %body, "Backend returned error");
            return Err(self.unavailable(format!("backend returned {}", status)));
        }

        let api_response: ApiGenerateResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("failed to parse response: {}", e)))?;

        let image_url = api_response
            .images
            .into_iter()
            .next()
            .map(|img| img.url)
            .ok_or_else(|| self.unavailable("response contained no images"))?;
        let inference_secs = api_response.timings.map(|t| t.inference).unwrap_or(0.0);

        debug!(backend = %self.name, url = %image_url, inference_secs, "Downloading generated image");

        let image_response = self
            .client
            .get(&image_url)
            .send()
            .await
            .map_err(|e| self.download_failed(e.to_string()))?;

        if image_response.status() != StatusCode::OK {
            return Err(self.download_failed(format!("download returned {}", image_response.status())));
        }

        let bytes = image_response
            .bytes()
            .await
            .map_err(|e| self.download_failed(e.to_string()))?;

        Ok(GeneratedImage {
            bytes: bytes.to_vec(),
            inference_secs,
        })
    }
}

#[async_trait]
impl ImageBackend for SyncHttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "sync_http"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, size: &str, steps: u32) -> Result<GeneratedImage> {
        info!(backend = %self.name, model = %self.model, size = %size, steps, "Sending generate request");

        retry(self.retry_policy, &self.name, AppError::is_transient, |attempt| {
            debug!(backend = %self.name, attempt, "Generate attempt");
            self.attempt(prompt, size, steps)
        })
        .await
    }
}
