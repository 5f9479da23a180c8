// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-shape validation and input merging.
//!
//! These checks run before a job exists; failures are reported
//! synchronously and never enter the index.

use sb_core::{Confirmation, ErrorCode};
use serde::Deserialize;
use serde_json::Value;

use crate::lifecycle::DispatchError;

/// Parsed body of `POST /spell-executions`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub button_id: String,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub confirmation: Confirmation,
}

impl SubmitRequest {
    /// Parse a request body, mapping any shape problem to `BAD_REQUEST`.
    pub fn parse(body: &[u8]) -> Result<Self, DispatchError> {
        let request: SubmitRequest = serde_json::from_slice(body).map_err(|e| {
            DispatchError::new(ErrorCode::BadRequest, format!("invalid request body: {e}"))
        })?;
        if request.button_id.is_empty() {
            return Err(DispatchError::new(
                ErrorCode::BadRequest,
                "button_id is required",
            ));
        }
        Ok(request)
    }
}

/// Validate an Idempotency-Key header value.
///
/// The trimmed value must be 1..=128 bytes of printable ASCII.
pub fn validate_idempotency_key(raw: &str) -> Result<String, DispatchError> {
    let key = raw.trim();
    if key.is_empty() || key.len() > 128 {
        return Err(DispatchError::new(
            ErrorCode::BadRequest,
            "Idempotency-Key must be 1..128 characters",
        ));
    }
    if !key.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        return Err(DispatchError::new(
            ErrorCode::BadRequest,
            "Idempotency-Key must be printable ASCII",
        ));
    }
    Ok(key.to_string())
}

/// Overlay caller input onto the button's defaults.
///
/// Top-level object keys from the caller win; non-object caller input
/// replaces the defaults wholesale.
pub fn merge_input(defaults: &Value, input: Option<&Value>) -> Value {
    match input {
        None | Some(Value::Null) => defaults.clone(),
        Some(Value::Object(overlay)) => {
            let mut merged = match defaults {
                Value::Object(map) => map.clone(),
                _ => serde_json::Map::new(),
            };
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        Some(other) => other.clone(),
    }
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;
