//! Common traits and types for image generation backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Image bytes produced by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// Raw encoded image (PNG, JPEG, ...)
    pub bytes: Vec<u8>,

    /// Inference time reported by the backend in seconds. Advisory only;
    /// zero when the backend does not report it.
    pub inference_secs: f64,
}

/// Backend description for status output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStatus {
    pub name: String,
    pub kind: String,
    pub model: String,
}

/// Trait for image generation backends
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Get the backend kind (sync_http or queue)
    fn kind(&self) -> &str;

    /// Model identifier sent upstream
    fn model(&self) -> &str;

    /// Generate one image. `size` is a `WIDTHxHEIGHT` string; `steps` is the
    /// requested inference step count, which a backend may ignore.
    async fn generate(&self, prompt: &str, size: &str, steps: u32) -> Result<GeneratedImage>;

    /// Get current status
    fn status(&self) -> BackendStatus {
        BackendStatus {
            name: self.name().to_string(),
            kind: self.kind().to_string(),
            model: self.model().to_string(),
        }
    }
}
