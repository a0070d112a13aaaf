//! Router construction

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::middleware::admin_auth::AdminAuthLayer;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/admin/status", get(handlers::admin_status))
        .route("/admin/enabled", put(handlers::set_enabled))
        .route("/admin/default-service", put(handlers::set_default_service))
        .layer(AdminAuthLayer::new(state.settings.admin.tokens.clone()));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/draw", post(handlers::draw))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
