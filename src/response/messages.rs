//! User-facing replies for aborted requests
//!
//! End users get a line picked from a configured pool instead of the raw
//! error text, which only goes to the logs.

use rand::seq::SliceRandom;

use crate::config::MessagesConfig;
use crate::error::AppError;

pub struct MessagePool {
    config: MessagesConfig,
}

impl MessagePool {
    pub fn new(config: MessagesConfig) -> Self {
        Self { config }
    }

    fn pool_for(&self, err: &AppError) -> &[String] {
        let pool = match err.abort_reason() {
            "cooldown" => &self.config.cooldown,
            "busy" => &self.config.busy,
            "filtered" => &self.config.filtered,
            "optimize_failed" => &self.config.optimize_failed,
            "provider_error" | "timeout" => &self.config.provider_error,
            "download_failed" => &self.config.download_failed,
            "unknown_service" => &self.config.unknown_service,
            "disabled" => &self.config.disabled,
            _ => &self.config.fallback,
        };
        if pool.is_empty() {
            &self.config.fallback
        } else {
            pool
        }
    }

    /// Pick a reply for `err`, filling `{remaining}` for cooldowns
    pub fn render(&self, err: &AppError) -> String {
        // Validation errors describe the caller's own input, so they are safe to echo
        if let AppError::InvalidRequest(detail) = err {
            return detail.clone();
        }

        let template = self
            .pool_for(err)
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "Something went wrong, please try again later.".to_string());

        match err {
            AppError::CooldownActive { remaining_secs } => {
                template.replace("{remaining}", &remaining_secs.to_string())
            }
            _ => template,
        }
    }
}
