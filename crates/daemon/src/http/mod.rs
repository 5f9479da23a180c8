// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: router, auth plumbing and JSON envelopes.
//!
//! Every response is a JSON envelope: `{ok:true, …}` on success,
//! `{ok:false, error_code, message}` on failure. A leading `/api` path
//! segment is stripped before routing so both spellings of every route
//! work.

mod buttons;
mod envelope;
mod executions;
mod output;
mod stream;
mod tenants;

use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use sb_core::{SystemClock, UuidIdGen};
use sb_engine::{ApiAuthContext, AuthMode, AuthorizedContext, Dispatcher};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub use envelope::{json_response, ApiError};

/// The production dispatcher type.
pub type AppDispatcher = Dispatcher<SystemClock, UuidIdGen>;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<AppDispatcher>,
    pub auth: AuthMode,
}

/// Build the full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(crate::ui::index))
        .route("/ui", get(crate::ui::index))
        .route("/ui/app.js", get(crate::ui::app_js))
        .route("/buttons", get(buttons::list_buttons))
        .route(
            "/spell-executions",
            post(executions::submit).get(executions::list),
        )
        .route("/spell-executions/{id}", get(executions::get_one))
        .route("/spell-executions/{id}/cancel", post(executions::cancel))
        .route("/spell-executions/{id}/retry", post(executions::retry))
        .route("/spell-executions/{id}/events", get(stream::events))
        .route("/spell-executions/{id}/output", get(output::output))
        .route("/tenants/{id}/usage", get(tenants::usage))
        .fallback(unknown_route)
        .layer(axum::middleware::map_request(strip_api_prefix))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Response {
    json_response(StatusCode::OK, &serde_json::json!({"ok": true}))
}

async fn unknown_route() -> ApiError {
    ApiError::new(sb_core::ErrorCode::BadRequest, "unknown route").with_status(StatusCode::NOT_FOUND)
}

fn handle_panic(_panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &serde_json::json!({
            "ok": false,
            "error_code": "INTERNAL_ERROR",
            "message": "request handler panicked",
        }),
    )
}

/// Rewrite `/api/...` to `/...` before routing.
async fn strip_api_prefix(request: Request) -> Request {
    eprintln!("DEBUG before: {}", request.uri());
    let r = rewrite_api_prefix(request);
    eprintln!("DEBUG after: {}", r.uri());
    r
}

fn rewrite_api_prefix(mut request: Request) -> Request {
    let uri = request.uri();
    let path = uri.path();
    let Some(rest) = path.strip_prefix("/api") else {
        return request;
    };
    if !(rest.is_empty() || rest.starts_with('/')) {
        return request;
    }

    let new_path = if rest.is_empty() { "/" } else { rest };
    let rewritten = match uri.query() {
        Some(query) => format!("{new_path}?{query}"),
        None => new_path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = rewritten.parse().ok();
    if let Ok(new_uri) = Uri::from_parts(parts) {
        *request.uri_mut() = new_uri;
    }
    request
}

/// Token from `Authorization: Bearer <t>` or `X-Api-Key: <t>`.
pub(crate) fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Authorize a request against the configured credential mode.
pub(crate) fn authorize(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthorizedContext, ApiError> {
    let token = token_from_headers(headers);
    match state.auth.authorize(token.as_deref()) {
        ApiAuthContext::Authorized(ctx) => Ok(ctx),
        ApiAuthContext::Rejected { code, message } => Err(ApiError::new(code, message)),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
