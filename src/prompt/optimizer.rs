//! Prompt rewriting through an OpenAI-compatible chat completion endpoint

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::OptimizerConfig;
use crate::error::{AppError, Result};
use crate::retry::{retry, RetryPolicy};

const ECHO_MARKERS: [&str; 2] = ["Input:", "Output:"];

/// Rewrites raw user prompts into generation prompts
pub struct PromptOptimizer {
    enabled: bool,
    client: Client,
    completions_url: String,
    api_key: String,
    model: String,
    template: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl PromptOptimizer {
    pub fn new(config: &OptimizerConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            enabled: config.enabled,
            client,
            completions_url: format!("{}/v1/chat/completions", config.api_base.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            template: config.template.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_millis(config.timeout_ms),
            retry_policy: RetryPolicy::from_millis(config.max_attempts, config.retry_delay_ms),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Longest time a full `optimize` call can take
    pub fn budget(&self) -> Duration {
        if self.enabled {
            self.retry_policy.budget(self.timeout)
        } else {
            Duration::ZERO
        }
    }

    /// Rewrite `raw`. Fails with `OptimizationFailed` once every attempt is used up;
    /// callers decide whether to abort or fall back to the raw prompt.
    pub async fn optimize(&self, raw: &str) -> Result<String> {
        if !self.enabled {
            return Ok(raw.to_string());
        }

        let system_prompt = self.template.replace("{prompt}", raw);

        let optimized = retry(self.retry_policy, "prompt-optimizer", |_| true, |attempt| {
            debug!(attempt, model = %self.model, "Optimizing prompt");
            self.attempt(&system_prompt)
        })
        .await?;

        info!(original = %raw, optimized = %optimized, "Prompt optimized");
        Ok(optimized)
    }

    async fn attempt(&self, system_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "system",
                content: system_prompt.to_string(),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::OptimizationFailed(format!(
                        "no reply within {}ms",
                        self.timeout.as_millis()
                    ))
                } else {
                    AppError::OptimizationFailed(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Optimizer returned error");
            return Err(AppError::OptimizationFailed(format!("optimizer returned {}", status)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::OptimizationFailed(format!("failed to parse response: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AppError::OptimizationFailed("empty completion".to_string()));
        }

        let cleaned = clean_completion(&content);
        if cleaned.is_empty() {
            return Err(AppError::OptimizationFailed(
                "completion was empty after cleanup".to_string(),
            ));
        }
        Ok(cleaned)
    }
}

/// Put a completion on one line and drop `Input:`/`Output:` echoes
pub fn clean_completion(content: &str) -> String {
    let mut text = content.replace(['\r', '\n'], " ");
    for marker in ECHO_MARKERS {
        text = text.replace(marker, " ");
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
