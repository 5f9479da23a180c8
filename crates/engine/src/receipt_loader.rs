// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Receipt loading.
//!
//! Reads the cast runtime's log file and projects it onto the sanitized
//! receipt whitelist. Any read or parse failure yields an absent receipt
//! rather than an error: a missing receipt is a degraded answer, not a
//! failed request.

use sb_core::{project_receipt, Receipt};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Read a runtime log file as raw JSON.
pub fn read_runtime_log(path: &Path) -> Option<Value> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "runtime log unreadable");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "runtime log is not valid JSON");
            None
        }
    }
}

/// Load and project a receipt, annotating the owning tenant.
pub fn load_receipt(path: &Path, tenant_id: &str) -> Option<Receipt> {
    read_runtime_log(path).map(|log| project_receipt(&log, tenant_id))
}

#[cfg(test)]
#[path = "receipt_loader_tests.rs"]
mod tests;
