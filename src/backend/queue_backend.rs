//! Queue backend: submit a job, poll its status, then fetch the result
//!
//! The image in the result is either an inline `data:image/...;base64,` URI
//! or a URL that has to be downloaded separately.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::aspect::AspectBucket;
use crate::backend::traits::{GeneratedImage, ImageBackend};
use crate::config::{AspectRatios, QueueConfig};
use crate::error::{AppError, Result};
use crate::response::base64;
use crate::retry::{retry, RetryPolicy};

/// Backend for submit/poll style generation APIs
pub struct QueueBackend {
    name: String,
    client: Client,
    queue_base: String,
    api_key: String,
    model: String,
    enable_safety_checker: bool,
    safety_tolerance: String,
    output_format: String,
    sync_mode: bool,
    aspect_ratios: AspectRatios,
    poll_interval: Duration,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    prompt: &'a str,
    enable_safety_checker: bool,
    safety_tolerance: &'a str,
    output_format: &'a str,
    aspect_ratio: &'a str,
    sync_mode: bool,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
    #[serde(default)]
    status_url: Option<String>,
    #[serde(default)]
    response_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    #[serde(default)]
    images: Vec<ResultImage>,
}

#[derive(Debug, Deserialize)]
struct ResultImage {
    url: String,
}

impl QueueBackend {
    /// Create a new backend from configuration
    pub fn new(config: &QueueConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: config.name.clone(),
            client,
            queue_base: config.queue_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            enable_safety_checker: config.enable_safety_checker,
            safety_tolerance: config.safety_tolerance.clone(),
            output_format: config.output_format.clone(),
            sync_mode: config.sync_mode,
            aspect_ratios: config.aspect_ratios.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            retry_policy: RetryPolicy::from_millis(config.max_retries, config.retry_delay_ms),
        })
    }

    /// Aspect ratio string sent upstream for a `WIDTHxHEIGHT` size
    pub fn aspect_ratio_for(&self, size: &str) -> &str {
        AspectBucket::from_size(size).ratio(&self.aspect_ratios)
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

    fn transport_error(&self, what: &str, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            self.unavailable(format!("{} timed out", what))
        } else {
            self.unavailable(format!("{} failed: {}", what, e))
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Key {}", self.api_key))
            .send()
            .await
            .map_err(|e| self.transport_error(what, e))?;

        // The queue answers 202 while a job is still pending
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(backend = %self.name, status = %status, body = %body, "{} returned error", what);
            return Err(self.unavailable(format!("{} returned {}", what, status)));
        }

        response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("failed to parse {} response: {}", what, e)))
    }

    async fn submit(&self, prompt: &str, size: &str) -> Result<SubmitResponse> {
        let body = SubmitRequest {
            prompt,
            enable_safety_checker: self.enable_safety_checker,
            safety_tolerance: &self.safety_tolerance,
            output_format: &self.output_format,
            aspect_ratio: self.aspect_ratio_for(size),
            sync_mode: self.sync_mode,
        };

        debug!(backend = %self.name, arguments = ?body, "Submitting job");

        let response = self
            .client
            .post(format!("{}/{}", self.queue_base, self.model))
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error("submit", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(backend = %self.name, status = %status, body = %body, "Submit returned error");
            return Err(self.unavailable(format!("submit returned {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("failed to parse submit response: {}", e)))
    }

    async fn wait_for_completion(&self, status_url: &str, started: Instant) -> Result<()> {
        loop {
            let status: StatusResponse = self.get_json(status_url, "status").await?;
            match status.status.as_str() {
                "COMPLETED" => return Ok(()),
                "IN_QUEUE" | "IN_PROGRESS" => {
                    debug!(backend = %self.name, status = %status.status, "Job pending");
                }
                other => {
                    return Err(self.unavailable(format!("job ended with status {}", other)));
                }
            }

            if started.elapsed() + self.poll_interval > self.timeout {
                return Err(self.unavailable(format!(
                    "job not completed within {}ms",
                    self.timeout.as_millis()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Turn the payload reference from the result into bytes
    pub async fn resolve_payload(&self, payload: &str) -> Result<Vec<u8>> {
        if base64::is_data_uri(payload) {
            debug!(backend = %self.name, "Decoding inline image payload");
            return base64::decode_data_uri(payload)
                .map_err(|e| self.unavailable(format!("bad inline image: {}", e)));
        }

        debug!(backend = %self.name, url = %payload, "Downloading image payload");
        let response = self
            .client
            .get(payload)
            .send()
            .await
            .map_err(|e| self.download_failed(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(self.download_failed(format!("download returned {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.download_failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn attempt(&self, prompt: &str, size: &str) -> Result<GeneratedImage> {
        let started = Instant::now();
        let submitted = self.submit(prompt, size).await?;
        info!(backend = %self.name, request_id = %submitted.request_id, "Job submitted");

        let request_base = format!("{}/{}/requests/{}", self.queue_base, self.model, submitted.request_id);
        let status_url = submitted
            .status_url
            .unwrap_or_else(|| format!("{}/status", request_base));
        let response_url = submitted.response_url.unwrap_or(request_base);

        self.wait_for_completion(&status_url, started).await?;

        let result: ResultResponse = self.get_json(&response_url, "result").await?;
        let payload = result
            .images
            .into_iter()
            .next()
            .map(|img| img.url)
            .ok_or_else(|| self.unavailable("result contained no images"))?;

        let bytes = self.resolve_payload(&payload).await?;

        Ok(GeneratedImage {
            bytes,
            inference_secs: 0.0,
        })
    }
}

#[async_trait]
impl ImageBackend for QueueBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "queue"
    }

    fn model(&self) -> &str {
        &self.model
    }

    /// `steps` has no effect here: the queue models run a fixed step count.
    async fn generate(&self, prompt: &str, size: &str, steps: u32) -> Result<GeneratedImage> {
        debug!(backend = %self.name, steps, "Step count is not supported by queue backends, ignoring");
        info!(backend = %self.name, model = %self.model, size = %size, "Sending generate request");

        retry(self.retry_policy, &self.name, AppError::is_transient, |attempt| {
            debug!(backend = %self.name, attempt, "Generate attempt");
            self.attempt(prompt, size)
        })
        .await
    }
}
