//! Registry of named image backends

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::backend::queue_backend::QueueBackend;
use crate::backend::sync_backend::SyncHttpBackend;
use crate::backend::traits::{BackendStatus, ImageBackend};
use crate::config::ProviderConfig;
use crate::error::{AppError, Result};

/// Name → backend map. Lookups never fall back to another backend.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn ImageBackend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register one backend per configured provider
    pub fn initialize_from_config(&self, providers: &[ProviderConfig]) -> Result<()> {
        for provider in providers {
            let backend: Arc<dyn ImageBackend> = match provider {
                ProviderConfig::SyncHttp(config) => Arc::new(SyncHttpBackend::new(config)?),
                ProviderConfig::Queue(config) => Arc::new(QueueBackend::new(config)?),
            };
            self.register(provider.name(), backend);
        }
        Ok(())
    }

    /// Register a backend, replacing any previous one with the same name
    pub fn register(&self, name: impl Into<String>, backend: Arc<dyn ImageBackend>) {
        let name = name.into();
        info!(backend = %name, kind = %backend.kind(), model = %backend.model(), "Registered backend");
        self.backends.write().insert(name, backend);
    }

    /// Look up a backend by service name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ImageBackend>> {
        self.backends.read().get(name).cloned().ok_or_else(|| {
            error!(backend = %name, "Requested backend is not registered");
            AppError::UnknownServiceRequested(name.to_string())
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.read().contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Status of every registered backend, sorted by name
    pub fn statuses(&self) -> Vec<BackendStatus> {
        let mut statuses: Vec<BackendStatus> =
            self.backends.read().values().map(|b| b.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}
