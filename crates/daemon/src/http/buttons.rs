// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Button registry listing.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::{json, Value};

use super::{authorize, json_response, ApiError, AppState};

pub(crate) async fn list_buttons(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    authorize(&state, request.headers())?;
    let registry = state.dispatcher.registry();
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "ok": true,
            "version": registry.version,
            "buttons": serde_json::to_value(&registry.buttons).unwrap_or(Value::Array(vec![])),
        }),
    ))
}
