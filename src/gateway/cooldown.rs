//! Per-user cooldown between successful generations

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{AppError, Result};

/// Tracks when each user last got an image.
///
/// Entries are never evicted; the map grows with the number of distinct users.
pub struct CooldownTracker {
    cooldown: Duration,
    last_success: DashMap<String, Instant>,
}

impl CooldownTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_success: DashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Seconds the user still has to wait, rounded down and never below one
    pub fn remaining(&self, user_id: &str) -> Option<u64> {
        let last = *self.last_success.get(user_id)?;
        let elapsed = last.elapsed();
        if elapsed >= self.cooldown {
            return None;
        }
        Some((self.cooldown - elapsed).as_secs().max(1))
    }

    /// Fails with `CooldownActive` while the user is inside the window
    pub fn check(&self, user_id: &str) -> Result<()> {
        match self.remaining(user_id) {
            Some(remaining_secs) => {
                debug!(user_id = %user_id, remaining_secs, "User is cooling down");
                Err(AppError::CooldownActive { remaining_secs })
            }
            None => Ok(()),
        }
    }

    /// Start a new window for the user. Call only after a full success.
    pub fn record_success(&self, user_id: &str) {
        self.last_success.insert(user_id.to_string(), Instant::now());
    }

    pub fn tracked_users(&self) -> usize {
        self.last_success.len()
    }
}
