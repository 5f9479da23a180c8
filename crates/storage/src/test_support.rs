// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders shared by this crate's tests.

use sb_core::epoch_ms_to_utc;
use sb_core::{Confirmation, Execution, ExecutionStatus, RequestSnapshot};
use serde_json::json;

pub(crate) fn sample(id: &str, status: ExecutionStatus) -> Execution {
    let terminal = status.is_terminal();
    Execution {
        execution_id: id.to_string(),
        button_id: "hello".into(),
        spell_id: "samples/hello".into(),
        version: "1.0.0".into(),
        require_signature: false,
        status,
        tenant_id: "default".into(),
        actor_role: None,
        created_at: epoch_ms_to_utc(1_700_000_000_000),
        started_at: None,
        finished_at: terminal.then(|| epoch_ms_to_utc(1_700_000_001_000)),
        error_code: None,
        message: None,
        runtime_execution_id: None,
        runtime_log_path: None,
        receipt: None,
        idempotency_key: None,
        idempotency_fingerprint: None,
        request: Some(RequestSnapshot {
            input: json!({}),
            dry_run: false,
            confirmation: Confirmation::default(),
        }),
        retry_of: None,
        retried_by: None,
    }
}

pub(crate) fn sample_terminal(id: &str) -> Execution {
    sample(id, ExecutionStatus::Succeeded)
}
