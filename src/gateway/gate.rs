//! Process-wide single-flight gate for generations

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One generation at a time across every user and backend.
///
/// Holding a [`GateGuard`] means holding the gate; dropping it releases the
/// gate on every path out of the guarded section, including cancellation.
#[derive(Clone, Default)]
pub struct ConcurrencyGate {
    lock: Arc<Mutex<()>>,
}

/// Proof of holding the gate
pub struct GateGuard {
    _guard: OwnedMutexGuard<()>,
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking peek used to turn users away early
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Acquire without waiting, or `None` when someone else holds the gate
    pub fn try_enter(&self) -> Option<GateGuard> {
        self.lock
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| GateGuard { _guard: guard })
    }

    /// Wait until the gate is free and acquire it. The draw pipeline never
    /// waits; it uses `try_enter`.
    pub async fn enter(&self) -> GateGuard {
        GateGuard {
            _guard: self.lock.clone().lock_owned().await,
        }
    }
}
