//! HTTP handlers for drawing and administration

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::backend::traits::BackendStatus;
use crate::error::AppError;
use crate::gateway::request::{DrawInput, GenerationResult};
use crate::response::base64;
use crate::response::messages::MessagePool;
use crate::AppState;

/// Error body returned to API clients
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// An `AppError` paired with the reply the end user should see
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(err: AppError, messages: &MessagePool) -> Self {
        if err.status_code().is_server_error() {
            error!(error = %err, "Request failed");
        }

        let retry_after_secs = match err {
            AppError::CooldownActive { remaining_secs } => Some(remaining_secs),
            _ => None,
        };

        Self {
            status: err.status_code(),
            body: ErrorResponse {
                error: ErrorDetail {
                    message: messages.render(&err),
                    r#type: err.error_type().to_string(),
                    code: err.abort_reason().to_string(),
                    retry_after_secs,
                },
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.body.error.retry_after_secs;
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DrawResponse {
    pub request_id: Uuid,
    pub prompt: String,
    pub optimized_prompt: String,
    pub size: String,
    pub steps: u32,
    pub service: String,
    pub inference_secs: f64,
    pub elapsed_secs: f64,
    pub generated_at: DateTime<Utc>,
    /// `data:image/...;base64,` URI
    pub image: String,
}

impl From<GenerationResult> for DrawResponse {
    fn from(result: GenerationResult) -> Self {
        let format = base64::detect_image_format(&result.image_bytes).unwrap_or("png");
        Self {
            request_id: result.request_id,
            image: base64::create_data_url(&result.image_bytes, format),
            prompt: result.original_prompt,
            optimized_prompt: result.optimized_prompt,
            size: result.size,
            steps: result.steps,
            service: result.service,
            inference_secs: result.inference_secs,
            elapsed_secs: result.elapsed.as_secs_f64(),
            generated_at: result.generated_at,
        }
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Malformed or mistyped bodies get the same error envelope as pipeline aborts
fn json_body<T>(payload: Result<Json<T>, JsonRejection>, state: &AppState) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        ApiError::new(AppError::InvalidRequest(rejection.body_text()), &state.messages)
    })
}

pub async fn draw(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DrawInput>, JsonRejection>,
) -> Result<Json<DrawResponse>, ApiError> {
    let input = json_body(payload, &state)?;
    state
        .orchestrator
        .draw(input)
        .await
        .map(|result| Json(DrawResponse::from(result)))
        .map_err(|e| ApiError::new(e, &state.messages))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminStatus {
    pub enabled: bool,
    pub default_service: String,
    pub services: Vec<String>,
    pub backends: Vec<BackendStatus>,
}

pub async fn admin_status(State(state): State<Arc<AppState>>) -> Json<AdminStatus> {
    let snapshot = state.control.snapshot();
    Json(AdminStatus {
        enabled: snapshot.enabled,
        default_service: snapshot.default_service,
        services: state.backend_registry.names(),
        backends: state.backend_registry.statuses(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SetEnabled {
    pub enabled: bool,
}

pub async fn set_enabled(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetEnabled>, JsonRejection>,
) -> Result<Json<AdminStatus>, ApiError> {
    let body = json_body(payload, &state)?;
    state.control.set_enabled(body.enabled);
    Ok(admin_status(State(state)).await)
}

#[derive(Debug, Deserialize)]
pub struct SetDefaultService {
    pub service: String,
}

pub async fn set_default_service(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetDefaultService>, JsonRejection>,
) -> Result<Json<AdminStatus>, ApiError> {
    let body = json_body(payload, &state)?;
    state
        .control
        .set_default_service(&body.service, &state.backend_registry)
        .map_err(|e| ApiError::new(e, &state.messages))?;
    info!(service = %body.service, "Default service updated via admin API");
    Ok(admin_status(State(state)).await)
}
