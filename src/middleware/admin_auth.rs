//! Bearer token check for the administrative routes

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use serde::Serialize;
use std::{
    collections::HashSet,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

#[derive(Serialize)]
struct AuthError {
    error: AuthErrorDetail,
}

#[derive(Serialize)]
struct AuthErrorDetail {
    message: String,
    r#type: String,
    code: String,
}

/// Admin authentication layer
#[derive(Clone)]
pub struct AdminAuthLayer {
    tokens: Arc<HashSet<String>>,
}

impl AdminAuthLayer {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens: Arc::new(tokens.into_iter().filter(|t| !t.is_empty()).collect()),
        }
    }
}

impl<S> Layer<S> for AdminAuthLayer {
    type Service = AdminAuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdminAuthMiddleware {
            inner,
            tokens: self.tokens.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AdminAuthMiddleware<S> {
    inner: S,
    tokens: Arc<HashSet<String>>,
}

impl<S> Service<Request<Body>> for AdminAuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // No tokens configured: admin routes are open
        if self.tokens.is_empty() {
            return Box::pin(self.inner.call(request));
        }

        let token = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.strip_prefix("Bearer ").unwrap_or(h).trim().to_string());

        match token {
            Some(token) if self.tokens.contains(&token) => Box::pin(self.inner.call(request)),
            Some(_) => {
                warn!(path = %request.uri().path(), "Invalid admin token");
                Box::pin(async move { Ok(unauthorized("Invalid admin token")) })
            }
            None => {
                warn!(path = %request.uri().path(), "Missing admin token");
                Box::pin(async move {
                    Ok(unauthorized(
                        "Admin token required. Provide via Authorization header: 'Bearer TOKEN'",
                    ))
                })
            }
        }
    }
}

fn unauthorized(message: &str) -> Response {
    let error = AuthError {
        error: AuthErrorDetail {
            message: message.to_string(),
            r#type: "authentication_error".to_string(),
            code: "invalid_admin_token".to_string(),
        },
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}
