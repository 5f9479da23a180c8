// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential validation.
//!
//! Two mutually exclusive modes: a flat set of opaque bearer tokens
//! (everyone lands in the `default` tenant with no role), or keyed
//! credentials of the form `tenant:role=token`. Token comparison is
//! constant-time so a byte-by-byte mismatch cannot be measured from
//! outside; length differences always mismatch.

use sb_core::ErrorCode;
use thiserror::Error;

/// Default tenant when credentials carry no tenant of their own.
pub const DEFAULT_TENANT: &str = "default";

/// Errors detecting a broken auth configuration at startup.
#[derive(Debug, Error)]
pub enum AuthConfigError {
    #[error("auth_tokens and auth_keys are mutually exclusive; configure one or the other")]
    ModeConflict,
    #[error("auth key entry {0:?} is not tenant:role=token or role:token")]
    MalformedKey(String),
    #[error("auth key entry has an invalid tenant id {0:?}")]
    InvalidTenant(String),
}

/// One parsed keyed credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthKey {
    pub tenant_id: String,
    pub role: String,
    pub token: String,
}

/// Identity attached to an authorized request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedContext {
    pub tenant_id: String,
    pub role: Option<String>,
}

impl AuthorizedContext {
    /// Admin role check used by cross-tenant operations.
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }

    /// True when this caller may act on a job owned by `tenant_id`.
    pub fn may_act_on(&self, tenant_id: &str) -> bool {
        self.is_admin() || self.tenant_id == tenant_id
    }
}

/// Result of authorizing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthContext {
    Authorized(AuthorizedContext),
    Rejected { code: ErrorCode, message: String },
}

/// The server's configured credential mode.
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// No credentials configured: anonymous access as the default tenant.
    Open,
    /// Opaque bearer tokens; tenant is always `default`, no role.
    Tokens(Vec<String>),
    /// Keyed credentials, tenant-scoped and role-bearing.
    Keys(Vec<AuthKey>),
}

impl AuthMode {
    /// Build from configuration, rejecting mixed modes at startup.
    pub fn from_config(tokens: &[String], keys: &[String]) -> Result<Self, AuthConfigError> {
        match (tokens.is_empty(), keys.is_empty()) {
            (false, false) => Err(AuthConfigError::ModeConflict),
            (false, true) => Ok(AuthMode::Tokens(tokens.to_vec())),
            (true, false) => {
                let parsed = keys
                    .iter()
                    .map(|entry| parse_auth_key(entry))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AuthMode::Keys(parsed))
            }
            (true, true) => Ok(AuthMode::Open),
        }
    }

    /// Authorize a presented token (or its absence).
    pub fn authorize(&self, token: Option<&str>) -> ApiAuthContext {
        match self {
            AuthMode::Open => ApiAuthContext::Authorized(AuthorizedContext {
                tenant_id: DEFAULT_TENANT.to_string(),
                role: None,
            }),
            AuthMode::Tokens(tokens) => {
                let Some(presented) = token else {
                    return rejected(ErrorCode::AuthRequired, "missing bearer token");
                };
                if tokens
                    .iter()
                    .any(|t| constant_time_eq(t.as_bytes(), presented.as_bytes()))
                {
                    ApiAuthContext::Authorized(AuthorizedContext {
                        tenant_id: DEFAULT_TENANT.to_string(),
                        role: None,
                    })
                } else {
                    rejected(ErrorCode::AuthInvalid, "unrecognized token")
                }
            }
            AuthMode::Keys(keys) => {
                let Some(presented) = token else {
                    return rejected(ErrorCode::AuthRequired, "missing api key");
                };
                for key in keys {
                    if constant_time_eq(key.token.as_bytes(), presented.as_bytes()) {
                        return ApiAuthContext::Authorized(AuthorizedContext {
                            tenant_id: key.tenant_id.clone(),
                            role: Some(key.role.clone()),
                        });
                    }
                }
                rejected(ErrorCode::AuthInvalid, "unrecognized api key")
            }
        }
    }
}

fn rejected(code: ErrorCode, message: &str) -> ApiAuthContext {
    ApiAuthContext::Rejected {
        code,
        message: message.to_string(),
    }
}

/// Parse `tenant:role=token` or legacy `role:token`.
fn parse_auth_key(entry: &str) -> Result<AuthKey, AuthConfigError> {
    let key = if let Some((lhs, token)) = entry.split_once('=') {
        let (tenant, role) = match lhs.split_once(':') {
            Some((tenant, role)) => (tenant.to_string(), role.to_string()),
            None => (DEFAULT_TENANT.to_string(), lhs.to_string()),
        };
        AuthKey {
            tenant_id: tenant,
            role,
            token: token.to_string(),
        }
    } else if let Some((role, token)) = entry.split_once(':') {
        AuthKey {
            tenant_id: DEFAULT_TENANT.to_string(),
            role: role.to_string(),
            token: token.to_string(),
        }
    } else {
        return Err(AuthConfigError::MalformedKey(entry.to_string()));
    };

    if key.role.is_empty() || key.token.is_empty() {
        return Err(AuthConfigError::MalformedKey(entry.to_string()));
    }
    if !sb_core::is_valid_tenant_id(&key.tenant_id) {
        return Err(AuthConfigError::InvalidTenant(key.tenant_id));
    }
    Ok(key)
}

/// Constant-time byte comparison. Lengths are compared first; equal-length
/// inputs are folded with XOR so the scan never exits early.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
