// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output-reference endpoint.
//!
//! Resolves `path=step.<name>.stdout` or `step.<name>.json[.dot.path]`
//! against the `outputs` object of the raw runtime log. The sanitized
//! receipt never carries outputs; this endpoint reads the log file
//! directly and only ever returns the addressed value.

use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use sb_core::{is_valid_execution_id, ErrorCode};
use sb_engine::receipt_loader::read_runtime_log;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{authorize, json_response, ApiError, AppState};

/// A parsed output reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OutputPath {
    Stdout { step: String },
    Json { step: String, pointer: Vec<String> },
}

/// Parse `step.<name>.stdout` / `step.<name>.json[.dot.path]`.
pub(crate) fn parse_output_path(raw: &str) -> Option<OutputPath> {
    let mut segments = raw.split('.');
    if segments.next() != Some("step") {
        return None;
    }
    let step = segments.next()?.to_string();
    if step.is_empty() {
        return None;
    }
    match segments.next()? {
        "stdout" => {
            if segments.next().is_some() {
                return None;
            }
            Some(OutputPath::Stdout { step })
        }
        "json" => {
            let pointer: Vec<String> = segments.map(str::to_string).collect();
            if pointer.iter().any(|s| s.is_empty()) {
                return None;
            }
            Some(OutputPath::Json { step, pointer })
        }
        _ => None,
    }
}

/// Resolve a parsed reference against the log's `outputs`.
pub(crate) fn resolve_output(log: &Value, path: &OutputPath) -> Option<Value> {
    let outputs = log.get("outputs")?;
    match path {
        OutputPath::Stdout { step } => outputs.get(step)?.get("stdout").cloned(),
        OutputPath::Json { step, pointer } => {
            let mut cursor = outputs.get(step)?.get("json")?;
            for segment in pointer {
                cursor = match cursor {
                    Value::Object(map) => map.get(segment)?,
                    Value::Array(items) => {
                        let index: usize = segment.parse().ok()?;
                        items.get(index)?
                    }
                    _ => return None,
                };
            }
            Some(cursor.clone())
        }
    }
}

pub(crate) async fn output(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    request: Request,
) -> Result<Response, ApiError> {
    let auth = authorize(&state, request.headers())?;
    if !is_valid_execution_id(&id) {
        return Err(ApiError::new(
            ErrorCode::InvalidExecutionId,
            "malformed execution id",
        ));
    }
    let job = state
        .dispatcher
        .get(&id)
        .ok_or_else(|| ApiError::new(ErrorCode::ExecutionNotFound, "no such execution"))?;
    if !auth.may_act_on(&job.tenant_id) {
        return Err(ApiError::new(
            ErrorCode::TenantForbidden,
            "execution belongs to another tenant",
        ));
    }

    let raw_path = params
        .get("path")
        .ok_or_else(|| ApiError::new(ErrorCode::InvalidOutputPath, "path parameter is required"))?;
    let parsed = parse_output_path(raw_path).ok_or_else(|| {
        ApiError::new(
            ErrorCode::InvalidOutputPath,
            "path must be step.<name>.stdout or step.<name>.json[.dot.path]",
        )
    })?;

    let log_path = job.runtime_log_path.as_deref().ok_or_else(|| {
        ApiError::new(
            ErrorCode::ExecutionNotReady,
            "runtime log not yet recorded for this execution",
        )
    })?;
    let log = read_runtime_log(std::path::Path::new(log_path)).ok_or_else(|| {
        ApiError::new(ErrorCode::ExecutionLogNotFound, "runtime log unreadable")
    })?;

    let value = resolve_output(&log, &parsed).ok_or_else(|| {
        ApiError::new(
            ErrorCode::OutputNotFound,
            format!("no output at {raw_path:?}"),
        )
    })?;

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "ok": true,
            "execution_id": job.execution_id,
            "path": raw_path,
            "value": value,
        }),
    ))
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
