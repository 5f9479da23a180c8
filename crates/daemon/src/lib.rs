// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spellboard Daemon (sbd)
//!
//! HTTP-fronted execution dispatch server: pre-registered buttons are
//! pressed over HTTP and each press becomes a supervised run of the cast
//! runtime.
//!
//! Architecture:
//! - HTTP listener: axum router, one task per request
//! - Lifecycle engine (sb-engine): owns the execution index
//! - Supervisor tasks: one per in-flight execution

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod http;
pub mod server;
pub mod ui;

pub use config::Config;
pub use server::{Server, ServerError};
