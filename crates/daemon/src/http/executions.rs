// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution endpoints: submit, list, get, cancel, retry.

use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use sb_core::{is_valid_execution_id, ErrorCode};
use sb_engine::{ListFilter, SubmitRequest};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;

use super::{authorize, json_response, ApiError, AppState};

pub(crate) async fn submit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let auth = authorize(&state, &parts.headers)?;

    let idempotency_key = parts
        .headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let limit = state.dispatcher.config().request_body_limit_bytes;
    let bytes = axum::body::to_bytes(body, limit).await.map_err(|_| {
        ApiError::new(
            ErrorCode::InputTooLarge,
            format!("request body exceeds {limit} bytes"),
        )
    })?;
    let submit = SubmitRequest::parse(&bytes)?;

    let outcome = state
        .dispatcher
        .submit(
            submit,
            &auth,
            &addr.ip().to_string(),
            idempotency_key.as_deref(),
        )
        .await?;

    let mut payload = json!({
        "ok": true,
        "execution_id": outcome.execution_id,
        "tenant_id": outcome.tenant_id,
        "status": outcome.status,
    });
    if outcome.idempotent_replay {
        payload["idempotent_replay"] = json!(true);
    }
    Ok(json_response(StatusCode::ACCEPTED, &payload))
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    request: Request,
) -> Result<Response, ApiError> {
    let auth = authorize(&state, request.headers())?;
    let filter = ListFilter::from_query(&params)?;
    let (filter, executions) = state.dispatcher.list(filter, &auth)?;

    let executions: Vec<Value> = executions
        .iter()
        .map(|job| serde_json::to_value(job).unwrap_or(Value::Null))
        .collect();
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "ok": true,
            "filters": filter_echo(&filter),
            "executions": executions,
        }),
    ))
}

fn filter_echo(filter: &ListFilter) -> Value {
    json!({
        "status": filter
            .status
            .as_ref()
            .map(|statuses| statuses.iter().map(|s| s.to_string()).collect::<Vec<_>>()),
        "button_id": filter.button_id,
        "spell_id": filter.spell_id,
        "tenant_id": filter.tenant_id,
        "from": filter.from.map(|t| t.to_rfc3339()),
        "to": filter.to.map(|t| t.to_rfc3339()),
        "limit": filter.limit,
    })
}

pub(crate) async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
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

    let receipt = serde_json::to_value(&job.receipt).unwrap_or(Value::Null);
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "ok": true,
            "execution": serde_json::to_value(&job).unwrap_or(Value::Null),
            "receipt": receipt,
        }),
    ))
}

pub(crate) async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let auth = authorize(&state, request.headers())?;
    let job = state.dispatcher.cancel(&id, &auth).await?;
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "ok": true,
            "execution_id": job.execution_id,
            "tenant_id": job.tenant_id,
            "status": job.status,
        }),
    ))
}

pub(crate) async fn retry(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let auth = authorize(&state, request.headers())?;
    let job = state
        .dispatcher
        .retry(&id, &auth, &addr.ip().to_string())
        .await?;
    Ok(json_response(
        StatusCode::ACCEPTED,
        &json!({
            "ok": true,
            "execution_id": job.execution_id,
            "tenant_id": job.tenant_id,
            "status": job.status,
            "retry_of": job.retry_of,
        }),
    ))
}
