//! Application settings and configuration management

use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    pub draw: DrawConfig,
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub content_filter: ContentFilterConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Tokens accepted on the administrative routes. Empty means unrestricted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Named size presets and their pixel dimensions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageSizes {
    #[serde(default = "default_landscape")]
    pub landscape: String,
    #[serde(default = "default_portrait")]
    pub portrait: String,
    #[serde(default = "default_square")]
    pub square: String,
}

impl Default for ImageSizes {
    fn default() -> Self {
        Self {
            landscape: default_landscape(),
            portrait: default_portrait(),
            square: default_square(),
        }
    }
}

fn default_landscape() -> String {
    "1024x576".to_string()
}

fn default_portrait() -> String {
    "576x1024".to_string()
}

fn default_square() -> String {
    "1024x1024".to_string()
}

/// Drawing pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DrawConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub default_service: String,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_size_preset")]
    pub default_size: String,
    #[serde(default = "default_steps")]
    pub default_steps: u32,
    #[serde(default)]
    pub image_sizes: ImageSizes,
    /// Upper bound for the locked section of one request. Derived from the
    /// optimizer and provider budgets when unset.
    #[serde(default)]
    pub pipeline_deadline_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_cooldown() -> u64 {
    60
}

fn default_size_preset() -> String {
    "square".to_string()
}

fn default_steps() -> u32 {
    20
}

/// What the pipeline does when every optimization attempt fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerFailurePolicy {
    #[default]
    Abort,
    FallbackToRaw,
}

/// Prompt optimizer configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_optimizer_model")]
    pub model: String,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_optimizer_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_optimizer_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_optimizer_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub on_failure: OptimizerFailurePolicy,
}

fn default_optimizer_model() -> String {
    "gemini-1.5-pro-latest".to_string()
}

fn default_template() -> String {
    "Rewrite the following image description as a detailed English prompt for an image \
     generation model. Reply with the prompt only.\nInput: {prompt}\nOutput:"
        .to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    200
}

fn default_optimizer_timeout() -> u64 {
    30_000
}

fn default_optimizer_attempts() -> u32 {
    3
}

fn default_optimizer_retry_delay() -> u64 {
    1_000
}

/// Keyword blocklist configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContentFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Pools of user-facing replies, one pool per abort reason
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagesConfig {
    #[serde(default = "default_cooldown_messages")]
    pub cooldown: Vec<String>,
    #[serde(default = "default_busy_messages")]
    pub busy: Vec<String>,
    #[serde(default = "default_filtered_messages")]
    pub filtered: Vec<String>,
    #[serde(default = "default_optimize_failed_messages")]
    pub optimize_failed: Vec<String>,
    #[serde(default = "default_provider_error_messages")]
    pub provider_error: Vec<String>,
    #[serde(default = "default_download_failed_messages")]
    pub download_failed: Vec<String>,
    #[serde(default = "default_unknown_service_messages")]
    pub unknown_service: Vec<String>,
    #[serde(default = "default_disabled_messages")]
    pub disabled: Vec<String>,
    #[serde(default = "default_fallback_messages")]
    pub fallback: Vec<String>,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown_messages(),
            busy: default_busy_messages(),
            filtered: default_filtered_messages(),
            optimize_failed: default_optimize_failed_messages(),
            provider_error: default_provider_error_messages(),
            download_failed: default_download_failed_messages(),
            unknown_service: default_unknown_service_messages(),
            disabled: default_disabled_messages(),
            fallback: default_fallback_messages(),
        }
    }
}

fn default_cooldown_messages() -> Vec<String> {
    vec![
        "Drawing is cooling down, try again in {remaining}s.".to_string(),
        "Give the brushes a rest, {remaining}s to go.".to_string(),
    ]
}

fn default_busy_messages() -> Vec<String> {
    vec![
        "Someone else is drawing right now, please try again shortly.".to_string(),
        "The canvas is taken, try again in a moment.".to_string(),
    ]
}

fn default_filtered_messages() -> Vec<String> {
    vec!["That request can't be drawn.".to_string()]
}

fn default_optimize_failed_messages() -> Vec<String> {
    vec!["Couldn't make sense of that prompt right now, please try again.".to_string()]
}

fn default_provider_error_messages() -> Vec<String> {
    vec![
        "The image service is not responding, please try again later.".to_string(),
        "Drawing failed this time, please try again later.".to_string(),
    ]
}

fn default_download_failed_messages() -> Vec<String> {
    vec!["The picture was drawn but could not be fetched, please try again.".to_string()]
}

fn default_unknown_service_messages() -> Vec<String> {
    vec!["That drawing service does not exist.".to_string()]
}

fn default_disabled_messages() -> Vec<String> {
    vec!["Drawing is switched off at the moment.".to_string()]
}

fn default_fallback_messages() -> Vec<String> {
    vec!["Something went wrong while drawing, please try again later.".to_string()]
}

/// Per-provider configuration, tagged by backend kind
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Synchronous submit-and-download generation API
    SyncHttp(SyncHttpConfig),
    /// Queue-based submit/poll generation API
    Queue(QueueConfig),
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        match self {
            ProviderConfig::SyncHttp(c) => &c.name,
            ProviderConfig::Queue(c) => &c.name,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        match self {
            ProviderConfig::SyncHttp(c) => c.timeout_ms,
            ProviderConfig::Queue(c) => c.timeout_ms,
        }
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            ProviderConfig::SyncHttp(c) => c.max_retries,
            ProviderConfig::Queue(c) => c.max_retries,
        }
    }

    pub fn retry_delay_ms(&self) -> u64 {
        match self {
            ProviderConfig::SyncHttp(c) => c.retry_delay_ms,
            ProviderConfig::Queue(c) => c.retry_delay_ms,
        }
    }

    /// Worst case for all attempts of one `generate` call, including downloads
    pub fn generate_budget(&self) -> Duration {
        let timeout = Duration::from_millis(self.timeout_ms());
        // sync: submit + download
        // queue: submit and polling up to the window, the last status GET, result, download
        let per_attempt = match self {
            ProviderConfig::SyncHttp(_) => timeout * 2,
            ProviderConfig::Queue(_) => timeout * 4,
        };
        RetryPolicy::from_millis(self.max_retries(), self.retry_delay_ms()).budget(per_attempt)
    }

    fn validate(&self) -> Result<()> {
        let name = self.name();
        if name.is_empty() {
            return Err(config_error("Provider name cannot be empty".to_string()));
        }
        let (endpoint, model) = match self {
            ProviderConfig::SyncHttp(c) => (&c.endpoint, &c.model),
            ProviderConfig::Queue(c) => (&c.queue_base, &c.model),
        };
        if endpoint.is_empty() {
            return Err(config_error(format!("Provider '{}' must have an endpoint", name)));
        }
        if model.is_empty() {
            return Err(config_error(format!("Provider '{}' must have a model", name)));
        }
        if self.max_retries() == 0 {
            return Err(config_error(format!(
                "Provider '{}' must allow at least one attempt",
                name
            )));
        }
        Ok(())
    }
}

/// Synchronous HTTP backend settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncHttpConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_provider_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

/// Aspect ratio strings sent to queue backends for each bucket
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AspectRatios {
    #[serde(default = "default_wide_ratio")]
    pub wide: String,
    #[serde(default = "default_tall_ratio")]
    pub tall: String,
    #[serde(default = "default_square_ratio")]
    pub square: String,
}

impl Default for AspectRatios {
    fn default() -> Self {
        Self {
            wide: default_wide_ratio(),
            tall: default_tall_ratio(),
            square: default_square_ratio(),
        }
    }
}

fn default_wide_ratio() -> String {
    "16:9".to_string()
}

fn default_tall_ratio() -> String {
    "9:16".to_string()
}

fn default_square_ratio() -> String {
    "1:1".to_string()
}

/// Queue (submit/poll) backend settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default = "default_queue_base")]
    pub queue_base: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub enable_safety_checker: bool,
    #[serde(default = "default_safety_tolerance")]
    pub safety_tolerance: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    #[serde(default = "default_true")]
    pub sync_mode: bool,
    #[serde(default)]
    pub aspect_ratios: AspectRatios,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_provider_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_queue_base() -> String {
    "https://queue.fal.run".to_string()
}

fn default_safety_tolerance() -> String {
    "5".to_string()
}

fn default_output_format() -> String {
    "jpeg".to_string()
}

fn default_poll_interval() -> u64 {
    1_000
}

fn default_provider_timeout() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5_000
}

fn config_error(message: String) -> AppError {
    AppError::Config(config::ConfigError::Message(message))
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (prefixed with DRAW_GATEWAY_)
            .add_source(
                Environment::with_prefix("DRAW_GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(config_error("Server port cannot be 0".to_string()));
        }

        if !(1..=100).contains(&self.draw.default_steps) {
            return Err(config_error(format!(
                "draw.default_steps must be within 1..=100, got {}",
                self.draw.default_steps
            )));
        }

        crate::gateway::request::SizePreset::parse(&self.draw.default_size).ok_or_else(|| {
            config_error(format!(
                "draw.default_size '{}' is not a known preset",
                self.draw.default_size
            ))
        })?;

        for (preset, size) in [
            ("landscape", &self.draw.image_sizes.landscape),
            ("portrait", &self.draw.image_sizes.portrait),
            ("square", &self.draw.image_sizes.square),
        ] {
            if crate::backend::aspect::parse_dimensions(size).is_none() {
                return Err(config_error(format!(
                    "draw.image_sizes.{} '{}' must look like WIDTHxHEIGHT",
                    preset, size
                )));
            }
        }

        if self.optimizer.enabled {
            if self.optimizer.api_base.is_empty() {
                return Err(config_error("optimizer.api_base cannot be empty".to_string()));
            }
            if !self.optimizer.template.contains("{prompt}") {
                return Err(config_error(
                    "optimizer.template must contain a {prompt} placeholder".to_string(),
                ));
            }
            if self.optimizer.max_attempts == 0 {
                return Err(config_error("optimizer.max_attempts must be at least 1".to_string()));
            }
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !names.insert(provider.name()) {
                return Err(config_error(format!(
                    "Provider '{}' is configured more than once",
                    provider.name()
                )));
            }
        }

        if !names.contains(self.draw.default_service.as_str()) {
            return Err(config_error(format!(
                "draw.default_service '{}' does not match any configured provider",
                self.draw.default_service
            )));
        }

        Ok(())
    }
}
