//! Draw Gateway
//!
//! Dispatches text prompts to interchangeable image generation backends,
//! with per-user cooldowns, a single global generation slot, keyword
//! filtering and prompt optimization in front of every generation.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod prompt;
pub mod response;
pub mod retry;

pub use error::{AppError, Result};

use std::sync::Arc;

use backend::registry::BackendRegistry;
use gateway::{control::DrawControl, orchestrator::Orchestrator};
use response::messages::MessagePool;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub backend_registry: Arc<BackendRegistry>,
    pub control: Arc<DrawControl>,
    pub orchestrator: Arc<Orchestrator>,
    pub messages: Arc<MessagePool>,
}

impl AppState {
    /// Wire every component from validated settings
    pub fn from_settings(settings: config::Settings) -> Result<Self> {
        let registry = Arc::new(BackendRegistry::new());
        registry.initialize_from_config(&settings.providers)?;
        Self::with_registry(settings, registry)
    }

    /// Wire components around an already populated registry
    pub fn with_registry(settings: config::Settings, registry: Arc<BackendRegistry>) -> Result<Self> {
        let control = Arc::new(DrawControl::new(
            settings.draw.enabled,
            settings.draw.default_service.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(&settings, registry.clone(), control.clone())?);
        let messages = Arc::new(MessagePool::new(settings.messages.clone()));

        Ok(Self {
            settings: Arc::new(settings),
            backend_registry: registry,
            control,
            orchestrator,
            messages,
        })
    }
}
