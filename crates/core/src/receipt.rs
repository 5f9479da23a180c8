// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Receipt projection.
//!
//! The cast runtime writes an execution log as JSON. Only a fixed
//! whitelist of that document is ever surfaced to API clients; raw
//! stdout/stderr, environment and anything secret-shaped stay behind.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of the runtime's execution, flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReceipt {
    #[serde(rename = "stepName", default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(rename = "exitCode", default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Rollback statistics reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<u64>,
    #[serde(default)]
    pub manual_recovery_required: bool,
}

/// Sanitised projection of a runtime execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    /// Spell id as recorded by the runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Annotated from the owning job, not the log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl Receipt {
    /// True when the runtime reports compensation that needs an operator.
    pub fn rollback_incomplete(&self) -> bool {
        self.rollback
            .as_ref()
            .map(|r| r.manual_recovery_required)
            .unwrap_or(false)
    }
}

fn str_field(log: &Value, key: &str) -> Option<String> {
    log.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Project a raw runtime log onto the receipt whitelist.
///
/// Anything not named here — stdout, stderr, env, secrets, connector
/// payloads — is dropped. `tenant_id` comes from the owning job.
pub fn project_receipt(log: &Value, tenant_id: &str) -> Receipt {
    let steps = log
        .get("steps")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|step| StepReceipt {
                    step_name: str_field(step, "stepName").or_else(|| str_field(step, "name")),
                    uses: str_field(step, "uses"),
                    started_at: str_field(step, "started_at"),
                    finished_at: str_field(step, "finished_at"),
                    success: step.get("success").and_then(Value::as_bool),
                    exit_code: step.get("exitCode").and_then(Value::as_i64),
                    message: str_field(step, "message"),
                })
                .collect()
        })
        .unwrap_or_default();

    let rollback = log.get("rollback").map(|r| RollbackStats {
        attempted: r.get("attempted").and_then(Value::as_u64),
        succeeded: r.get("succeeded").and_then(Value::as_u64),
        failed: r.get("failed").and_then(Value::as_u64),
        skipped: r.get("skipped").and_then(Value::as_u64),
        manual_recovery_required: r
            .get("manual_recovery_required")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    });

    Receipt {
        execution_id: str_field(log, "execution_id"),
        id: str_field(log, "id"),
        version: str_field(log, "version"),
        started_at: str_field(log, "started_at"),
        finished_at: str_field(log, "finished_at"),
        summary: log.get("summary").cloned(),
        checks: log.get("checks").cloned(),
        steps,
        rollback,
        success: log.get("success").and_then(Value::as_bool),
        error: log.get("error").cloned(),
        tenant_id: Some(tenant_id.to_string()),
    }
}

#[cfg(test)]
#[path = "receipt_tests.rs"]
mod tests;
