//! Draw request and result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::config::{DrawConfig, ImageSizes};
use crate::error::{AppError, Result};

pub const MIN_STEPS: u32 = 1;
pub const MAX_STEPS: u32 = 100;

/// Named image size presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizePreset {
    Landscape,
    Portrait,
    Square,
}

impl SizePreset {
    /// Accepts the English names and the single-character aliases used by chat hosts
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "landscape" | "横" => Some(SizePreset::Landscape),
            "portrait" | "竖" => Some(SizePreset::Portrait),
            "square" | "正" => Some(SizePreset::Square),
            _ => None,
        }
    }

    /// Pixel dimensions configured for this preset
    pub fn dimensions<'a>(&self, sizes: &'a ImageSizes) -> &'a str {
        match self {
            SizePreset::Landscape => &sizes.landscape,
            SizePreset::Portrait => &sizes.portrait,
            SizePreset::Square => &sizes.square,
        }
    }
}

/// Unvalidated input as it arrives from a host
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrawInput {
    pub user_id: String,
    pub prompt: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub service: Option<String>,
}

/// A validated request. Fields are fixed once built.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    id: Uuid,
    user_id: String,
    raw_prompt: String,
    size: String,
    steps: u32,
    service: String,
}

impl GenerationRequest {
    /// Validate `input`, filling omitted or unusable size and steps and an omitted
    /// service from defaults
    pub fn build(input: DrawInput, draw: &DrawConfig, default_service: &str) -> Result<Self> {
        let user_id = input.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(AppError::InvalidRequest("user_id is required".to_string()));
        }

        let raw_prompt = input.prompt.trim().to_string();
        if raw_prompt.is_empty() {
            return Err(AppError::InvalidRequest("prompt is required".to_string()));
        }

        // Unknown presets and out-of-range step counts fall back to the configured defaults
        let default_preset = SizePreset::parse(&draw.default_size).unwrap_or(SizePreset::Square);
        let preset = match input.size.as_deref() {
            None => default_preset,
            Some(name) => SizePreset::parse(name).unwrap_or_else(|| {
                debug!(size = %name, default = %draw.default_size, "Unknown size preset, using default");
                default_preset
            }),
        };

        let steps = match input.steps {
            None => draw.default_steps,
            Some(steps) if (MIN_STEPS..=MAX_STEPS).contains(&steps) => steps,
            Some(steps) => {
                debug!(steps, default = draw.default_steps, "Step count out of range, using default");
                draw.default_steps
            }
        };

        let service = input
            .service
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_service.to_string());

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            raw_prompt,
            size: preset.dimensions(&draw.image_sizes).to_string(),
            steps,
            service,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn raw_prompt(&self) -> &str {
        &self.raw_prompt
    }

    pub fn size(&self) -> &str {
        &self.size
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

/// A finished generation, handed to the caller and not kept anywhere
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub request_id: Uuid,
    pub image_bytes: Vec<u8>,
    pub inference_secs: f64,
    pub original_prompt: String,
    pub optimized_prompt: String,
    pub size: String,
    pub steps: u32,
    pub service: String,
    /// Wall-clock time of the whole pipeline
    pub elapsed: Duration,
    pub generated_at: DateTime<Utc>,
}
