// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant usage endpoint.

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use sb_core::{is_valid_tenant_id, ErrorCode};
use serde_json::json;

use super::{authorize, json_response, ApiError, AppState};

pub(crate) async fn usage(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let auth = authorize(&state, request.headers())?;
    if !is_valid_tenant_id(&tenant_id) {
        return Err(ApiError::new(
            ErrorCode::InvalidTenantId,
            "malformed tenant id",
        ));
    }
    // Tenants may read their own usage; anything else is admin-only
    if !auth.is_admin() && auth.tenant_id != tenant_id {
        return Err(ApiError::new(
            ErrorCode::AdminRoleRequired,
            "cross-tenant usage requires the admin role",
        ));
    }

    let usage = state.dispatcher.usage(&tenant_id);
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "ok": true,
            "tenant_id": tenant_id,
            "usage": {
                "queued": usage.queued,
                "running": usage.running,
                "submissions_last_24h": usage.submissions_last_24h,
            },
        }),
    ))
}
