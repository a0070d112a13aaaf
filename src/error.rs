//! Common error types for the draw gateway

use axum::http::StatusCode;
use thiserror::Error;

/// Which side of the optimizer a content check ran on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    /// The prompt exactly as the user sent it
    Raw,
    /// The prompt returned by the optimizer
    Optimized,
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterStage::Raw => f.write_str("raw"),
            FilterStage::Optimized => f.write_str("optimized"),
        }
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Cooldown active, {remaining_secs}s remaining")]
    CooldownActive { remaining_secs: u64 },

    #[error("Another generation is in progress")]
    ConcurrencyBusy,

    #[error("Content rejected by filter ({stage} prompt)")]
    ContentRejected { stage: FilterStage },

    #[error("Prompt optimization failed: {0}")]
    OptimizationFailed(String),

    #[error("Provider '{backend}' unavailable: {reason}")]
    ProviderUnavailable { backend: String, reason: String },

    #[error("Image download from '{backend}' failed: {reason}")]
    DownloadFailed { backend: String, reason: String },

    #[error("Unknown service requested: {0}")]
    UnknownServiceRequested(String),

    #[error("Drawing is currently disabled")]
    DrawingDisabled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code naming why a request was aborted
    pub fn abort_reason(&self) -> &'static str {
        match self {
            AppError::CooldownActive { .. } => "cooldown",
            AppError::ConcurrencyBusy => "busy",
            AppError::ContentRejected { .. } => "filtered",
            AppError::OptimizationFailed(_) => "optimize_failed",
            AppError::ProviderUnavailable { .. } | AppError::HttpClient(_) => "provider_error",
            AppError::DownloadFailed { .. } => "download_failed",
            AppError::UnknownServiceRequested(_) => "unknown_service",
            AppError::DrawingDisabled => "disabled",
            AppError::InvalidRequest(_) | AppError::Json(_) => "invalid_request",
            AppError::Timeout(_) => "timeout",
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => "internal",
        }
    }

    /// HTTP status used when the error reaches the API surface
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ConcurrencyBusy => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ContentRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::OptimizationFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::ProviderUnavailable { .. } | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::DownloadFailed { .. } => StatusCode::BAD_GATEWAY,
            AppError::UnknownServiceRequested(_) => StatusCode::NOT_FOUND,
            AppError::DrawingDisabled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidRequest(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Error category reported in the `type` field of API error bodies
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::CooldownActive { .. } | AppError::ConcurrencyBusy => "rate_limit_error",
            AppError::ContentRejected { .. } => "content_policy_error",
            AppError::InvalidRequest(_) | AppError::Json(_) => "invalid_request_error",
            AppError::UnknownServiceRequested(_) => "not_found_error",
            AppError::OptimizationFailed(_)
            | AppError::ProviderUnavailable { .. }
            | AppError::HttpClient(_)
            | AppError::DownloadFailed { .. } => "backend_error",
            AppError::Timeout(_) => "timeout_error",
            AppError::DrawingDisabled
            | AppError::Config(_)
            | AppError::Io(_)
            | AppError::Internal(_) => "server_error",
        }
    }

    /// Whether a failed network step may be attempted again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::ProviderUnavailable { .. }
                | AppError::DownloadFailed { .. }
                | AppError::OptimizationFailed(_)
                | AppError::HttpClient(_)
                | AppError::Timeout(_)
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
