// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable error codes surfaced to API clients.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every error code the dispatcher can surface, with its HTTP status.
///
/// Codes are stable API surface: clients match on them, the audit log
/// records them, and the runtime classifier maps child-process output
/// onto the runtime-mapped subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input
    BadRequest,
    InvalidQuery,
    InvalidExecutionId,
    InvalidTenantId,
    InvalidOutputPath,
    InputTooLarge,
    RiskConfirmationRequired,
    BillingConfirmationRequired,

    // Auth & policy
    AuthRequired,
    AuthInvalid,
    RoleNotAllowed,
    TenantNotAllowed,
    TenantForbidden,
    AdminRoleRequired,

    // Resource & flow
    ConcurrencyLimited,
    TenantConcurrencyLimited,
    RateLimited,
    TenantRateLimited,
    IdempotencyConflict,

    // Not-found
    ButtonNotFound,
    ExecutionNotFound,
    ExecutionLogNotFound,
    OutputNotFound,

    // Runtime-mapped
    ExecutionFailed,
    ExecutionTimeout,
    StepTimeout,
    SignatureRequired,
    ConnectorTokenMissing,
    PlatformUnsupported,
    InputSchemaInvalid,
    CompensationIncomplete,

    // Lifecycle
    AlreadyTerminal,
    NotRetryable,
    ExecutionNotReady,
    ServerRestarted,
    ExecutionCanceled,

    // Internal
    InternalError,
}

impl ErrorCode {
    /// The HTTP status used when this code is returned synchronously.
    pub fn http_status(&self) -> u16 {
        use ErrorCode::*;
        match self {
            BadRequest | InvalidQuery | InvalidExecutionId | InvalidTenantId
            | InvalidOutputPath | RiskConfirmationRequired | BillingConfirmationRequired => 400,
            AuthRequired | AuthInvalid => 401,
            RoleNotAllowed | TenantNotAllowed | TenantForbidden | AdminRoleRequired => 403,
            ButtonNotFound | ExecutionNotFound | ExecutionLogNotFound | OutputNotFound => 404,
            IdempotencyConflict | AlreadyTerminal | NotRetryable | ExecutionNotReady => 409,
            InputTooLarge => 413,
            ConcurrencyLimited | TenantConcurrencyLimited | RateLimited | TenantRateLimited => 429,
            ExecutionFailed | ExecutionTimeout | StepTimeout | SignatureRequired
            | ConnectorTokenMissing | PlatformUnsupported | InputSchemaInvalid
            | CompensationIncomplete | ServerRestarted | ExecutionCanceled => 500,
            InternalError => 500,
        }
    }

    /// The wire spelling of the code.
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            BadRequest => "BAD_REQUEST",
            InvalidQuery => "INVALID_QUERY",
            InvalidExecutionId => "INVALID_EXECUTION_ID",
            InvalidTenantId => "INVALID_TENANT_ID",
            InvalidOutputPath => "INVALID_OUTPUT_PATH",
            InputTooLarge => "INPUT_TOO_LARGE",
            RiskConfirmationRequired => "RISK_CONFIRMATION_REQUIRED",
            BillingConfirmationRequired => "BILLING_CONFIRMATION_REQUIRED",
            AuthRequired => "AUTH_REQUIRED",
            AuthInvalid => "AUTH_INVALID",
            RoleNotAllowed => "ROLE_NOT_ALLOWED",
            TenantNotAllowed => "TENANT_NOT_ALLOWED",
            TenantForbidden => "TENANT_FORBIDDEN",
            AdminRoleRequired => "ADMIN_ROLE_REQUIRED",
            ConcurrencyLimited => "CONCURRENCY_LIMITED",
            TenantConcurrencyLimited => "TENANT_CONCURRENCY_LIMITED",
            RateLimited => "RATE_LIMITED",
            TenantRateLimited => "TENANT_RATE_LIMITED",
            IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            ButtonNotFound => "BUTTON_NOT_FOUND",
            ExecutionNotFound => "EXECUTION_NOT_FOUND",
            ExecutionLogNotFound => "EXECUTION_LOG_NOT_FOUND",
            OutputNotFound => "OUTPUT_NOT_FOUND",
            ExecutionFailed => "EXECUTION_FAILED",
            ExecutionTimeout => "EXECUTION_TIMEOUT",
            StepTimeout => "STEP_TIMEOUT",
            SignatureRequired => "SIGNATURE_REQUIRED",
            ConnectorTokenMissing => "CONNECTOR_TOKEN_MISSING",
            PlatformUnsupported => "PLATFORM_UNSUPPORTED",
            InputSchemaInvalid => "INPUT_SCHEMA_INVALID",
            CompensationIncomplete => "COMPENSATION_INCOMPLETE",
            AlreadyTerminal => "ALREADY_TERMINAL",
            NotRetryable => "NOT_RETRYABLE",
            ExecutionNotReady => "EXECUTION_NOT_READY",
            ServerRestarted => "SERVER_RESTARTED",
            ExecutionCanceled => "EXECUTION_CANCELED",
            InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_code_tests.rs"]
mod tests;
