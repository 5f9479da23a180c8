// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution job entity and status machine.
//!
//! An [`Execution`] is one supervised run of the cast runtime, created when
//! a button press is admitted. Status moves
//! queued → running → {succeeded, failed, timeout, canceled}; terminal
//! states never transition again. Only the lifecycle engine mutates these
//! records.

use crate::error_code::ErrorCode;
use crate::receipt::Receipt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an execution job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Timeout,
    Canceled,
}

impl ExecutionStatus {
    /// True for states that never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded
                | ExecutionStatus::Failed
                | ExecutionStatus::Timeout
                | ExecutionStatus::Canceled
        )
    }

    /// True for states counted against concurrency caps.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ExecutionStatus::Queued | ExecutionStatus::Running)
    }

    /// Parse the lowercase wire spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(ExecutionStatus::Queued),
            "running" => Some(ExecutionStatus::Running),
            "succeeded" => Some(ExecutionStatus::Succeeded),
            "failed" => Some(ExecutionStatus::Failed),
            "timeout" => Some(ExecutionStatus::Timeout),
            "canceled" => Some(ExecutionStatus::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Acknowledgements a button may require before dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(default)]
    pub risk_acknowledged: bool,
    #[serde(default)]
    pub billing_acknowledged: bool,
}

/// Snapshot of the admitted request, kept on the job for retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Merged input (button defaults overlaid with caller input)
    pub input: serde_json::Value,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub confirmation: Confirmation,
}

/// One supervised run of the cast runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub button_id: String,
    pub spell_id: String,
    pub version: String,
    pub require_signature: bool,
    pub status: ExecutionStatus,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_role: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Execution id reported by the cast runtime itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_execution_id: Option<String>,
    /// Path of the runtime's receipt log on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_log_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSnapshot>,
    /// Execution this one retries, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
    /// Execution that retried this one, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retried_by: Option<String>,
}

impl Execution {
    /// True once the job has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Anchor time for retention decisions.
    pub fn anchor_time(&self) -> DateTime<Utc> {
        self.finished_at.unwrap_or(self.created_at)
    }

    /// Structural validity check applied when loading the index file.
    ///
    /// Records that fail are dropped with a warning rather than poisoning
    /// the whole index.
    pub fn is_structurally_valid(&self) -> bool {
        if self.execution_id.is_empty() || self.button_id.is_empty() || self.tenant_id.is_empty() {
            return false;
        }
        if self.status.is_terminal() && self.finished_at.is_none() {
            return false;
        }
        if self.idempotency_key.is_some() && self.idempotency_fingerprint.is_none() {
            return false;
        }
        true
    }

    /// Deep-clone this job's request into a fresh retry job.
    ///
    /// The new job starts over in `queued` with its own identity; linkage
    /// fields are set by the caller after both sides are known.
    pub fn retry_clone(&self, new_id: String, now: DateTime<Utc>) -> Execution {
        Execution {
            execution_id: new_id,
            button_id: self.button_id.clone(),
            spell_id: self.spell_id.clone(),
            version: self.version.clone(),
            require_signature: self.require_signature,
            status: ExecutionStatus::Queued,
            tenant_id: self.tenant_id.clone(),
            actor_role: self.actor_role.clone(),
            created_at: now,
            started_at: None,
            finished_at: None,
            error_code: None,
            message: None,
            runtime_execution_id: None,
            runtime_log_path: None,
            receipt: None,
            idempotency_key: None,
            idempotency_fingerprint: None,
            request: self.request.clone(),
            retry_of: Some(self.execution_id.clone()),
            retried_by: None,
        }
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
