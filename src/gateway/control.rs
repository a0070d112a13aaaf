//! Runtime switches shared between the admin API and the orchestrator

use parking_lot::RwLock;
use tracing::info;

use crate::backend::registry::BackendRegistry;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSnapshot {
    pub enabled: bool,
    pub default_service: String,
}

/// Process-wide enable flag and default service.
///
/// Written only by the administrative surface, read once per request.
pub struct DrawControl {
    state: RwLock<ControlSnapshot>,
}

impl DrawControl {
    pub fn new(enabled: bool, default_service: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(ControlSnapshot {
                enabled,
                default_service: default_service.into(),
            }),
        }
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        self.state.read().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.read().enabled
    }

    pub fn default_service(&self) -> String {
        self.state.read().default_service.clone()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.write().enabled = enabled;
        info!(enabled, "Drawing toggled");
    }

    /// Switch which backend serves requests that don't name one
    pub fn set_default_service(&self, name: &str, registry: &BackendRegistry) -> Result<()> {
        if !registry.contains(name) {
            return Err(AppError::UnknownServiceRequested(name.to_string()));
        }
        let mut state = self.state.write();
        info!(from = %state.default_service, to = %name, "Default service switched");
        state.default_service = name.to_string();
        Ok(())
    }
}
