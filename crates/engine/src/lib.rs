// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sb-engine: admission, lifecycle and supervision for the dispatch server
//!
//! The [`Dispatcher`] owns the in-memory execution index and drives every
//! state transition. Admission (auth, rate limits, concurrency caps,
//! idempotency) happens before a job exists; the supervisor then runs the
//! cast child process and reports the terminal outcome back.

pub mod admission;
pub mod auth;
pub mod lifecycle;
pub mod rate_limit;
pub mod receipt_loader;
pub mod supervisor;

pub use admission::{merge_input, validate_idempotency_key, SubmitRequest};
pub use auth::{ApiAuthContext, AuthConfigError, AuthKey, AuthMode, AuthorizedContext};
pub use lifecycle::{
    DispatchConfig, DispatchError, Dispatcher, ListFilter, SubmitOutcome, UsageStats,
};
pub use rate_limit::RateHistory;
