// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime-error classification.
//!
//! When the cast child process exits non-zero, its stderr (falling back to
//! stdout) is matched against a fixed table of patterns to derive a stable
//! error code. Match order is load-bearing: the first hit wins.

use crate::error_code::ErrorCode;
use regex::Regex;
use std::sync::OnceLock;

/// Outcome of classifying runtime output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFailure {
    pub code: ErrorCode,
    pub message: String,
}

fn patterns() -> &'static Vec<(Regex, ErrorCode)> {
    static TABLE: OnceLock<Vec<(Regex, ErrorCode)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        // Priority order; do not reorder.
        let table: &[(&str, ErrorCode)] = &[
            (
                r"COMPENSATION_INCOMPLETE|manual[_ ]recovery[_ ]required|rollback incomplete",
                ErrorCode::CompensationIncomplete,
            ),
            (
                r"EXECUTION_TIMEOUT|execution timed out",
                ErrorCode::ExecutionTimeout,
            ),
            (r"STEP_TIMEOUT|step timed out", ErrorCode::StepTimeout),
            (r"INPUT_TOO_LARGE|input too large", ErrorCode::InputTooLarge),
            (
                r"SIGNATURE_REQUIRED|signature required|unsigned bundle",
                ErrorCode::SignatureRequired,
            ),
            (
                r"RISK_CONFIRMATION_REQUIRED|risk confirmation",
                ErrorCode::RiskConfirmationRequired,
            ),
            (
                r"BILLING_CONFIRMATION_REQUIRED|billing confirmation",
                ErrorCode::BillingConfirmationRequired,
            ),
            (
                r"CONNECTOR_TOKEN_MISSING|connector token",
                ErrorCode::ConnectorTokenMissing,
            ),
            (
                r"PLATFORM_UNSUPPORTED|unsupported platform|platform not supported",
                ErrorCode::PlatformUnsupported,
            ),
            (
                r"INPUT_SCHEMA_INVALID|input schema|schema validation failed",
                ErrorCode::InputSchemaInvalid,
            ),
        ];
        table
            .iter()
            .filter_map(|(pattern, code)| Regex::new(pattern).ok().map(|re| (re, *code)))
            .collect()
    })
}

/// First line containing the match, trimmed, for the failure message.
fn matched_line<'a>(text: &'a str, re: &Regex) -> Option<&'a str> {
    text.lines().find(|line| re.is_match(line)).map(str::trim)
}

/// First non-empty line of a blob, trimmed.
fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

/// Classify runtime output into a stable error code and message.
///
/// Stderr is authoritative; stdout is only consulted when stderr has no
/// match (some runtimes print their failure banner to stdout).
pub fn classify(stderr: &str, stdout: &str) -> RuntimeFailure {
    for (re, code) in patterns() {
        if let Some(line) = matched_line(stderr, re).or_else(|| matched_line(stdout, re)) {
            return RuntimeFailure {
                code: *code,
                message: line.to_string(),
            };
        }
    }

    let message = first_line(stderr)
        .or_else(|| first_line(stdout))
        .unwrap_or("cast runtime exited with a failure")
        .to_string();
    RuntimeFailure {
        code: ErrorCode::ExecutionFailed,
        message,
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
