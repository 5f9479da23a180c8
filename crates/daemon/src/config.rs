// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! All startup options as one record with defaults; `from_env` applies
//! `SB_*` overrides. The state directory (`spell_home`) holds the lock
//! file, the button registry and the `logs/` directory with the index,
//! the audit log and the runtime's receipts.

use sb_engine::DispatchConfig;
use std::path::PathBuf;

/// Startup options for the dispatch server.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// State directory; everything the server touches lives below it
    pub spell_home: PathBuf,
    pub registry_path: PathBuf,
    pub request_body_limit_bytes: usize,
    pub execution_timeout_ms: u64,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    pub tenant_rate_limit_window_ms: u64,
    pub tenant_rate_limit_max_requests: u32,
    pub max_concurrent_executions: u32,
    pub tenant_max_concurrent_executions: u32,
    /// Opaque bearer tokens (mutually exclusive with `auth_keys`)
    pub auth_tokens: Vec<String>,
    /// Keyed credentials `tenant:role=token` (or legacy `role:token`)
    pub auth_keys: Vec<String>,
    pub log_retention_days: u32,
    pub log_max_files: u32,
    pub force_require_signature: bool,
    pub runtime_interpreter: String,
    pub runtime_cli_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let spell_home = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".spellboard");
        Self {
            port: 8787,
            registry_path: spell_home.join("buttons.json"),
            runtime_cli_path: spell_home.join("cast.js"),
            spell_home,
            request_body_limit_bytes: 1024 * 1024,
            execution_timeout_ms: 300_000,
            rate_limit_window_ms: 60_000,
            rate_limit_max_requests: 60,
            tenant_rate_limit_window_ms: 60_000,
            tenant_rate_limit_max_requests: 30,
            max_concurrent_executions: 4,
            tenant_max_concurrent_executions: 2,
            auth_tokens: Vec::new(),
            auth_keys: Vec::new(),
            log_retention_days: 30,
            log_max_files: 200,
            force_require_signature: false,
            runtime_interpreter: "node".to_string(),
        }
    }
}

impl Config {
    /// Defaults with `SB_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(home) = env_var("SB_SPELL_HOME") {
            let home = PathBuf::from(home);
            config.registry_path = home.join("buttons.json");
            config.runtime_cli_path = home.join("cast.js");
            config.spell_home = home;
        }
        if let Some(path) = env_var("SB_REGISTRY_PATH") {
            config.registry_path = PathBuf::from(path);
        }
        if let Some(path) = env_var("SB_RUNTIME_CLI") {
            config.runtime_cli_path = PathBuf::from(path);
        }
        if let Some(value) = env_var("SB_RUNTIME_INTERPRETER") {
            config.runtime_interpreter = value;
        }
        if let Some(tokens) = env_var("SB_AUTH_TOKENS") {
            config.auth_tokens = split_list(&tokens);
        }
        if let Some(keys) = env_var("SB_AUTH_KEYS") {
            config.auth_keys = split_list(&keys);
        }

        set_parsed(&mut config.port, "SB_PORT");
        set_parsed(&mut config.request_body_limit_bytes, "SB_BODY_LIMIT_BYTES");
        set_parsed(&mut config.execution_timeout_ms, "SB_EXECUTION_TIMEOUT_MS");
        set_parsed(&mut config.rate_limit_window_ms, "SB_RATE_LIMIT_WINDOW_MS");
        set_parsed(&mut config.rate_limit_max_requests, "SB_RATE_LIMIT_MAX");
        set_parsed(
            &mut config.tenant_rate_limit_window_ms,
            "SB_TENANT_RATE_LIMIT_WINDOW_MS",
        );
        set_parsed(
            &mut config.tenant_rate_limit_max_requests,
            "SB_TENANT_RATE_LIMIT_MAX",
        );
        set_parsed(&mut config.max_concurrent_executions, "SB_MAX_CONCURRENT");
        set_parsed(
            &mut config.tenant_max_concurrent_executions,
            "SB_TENANT_MAX_CONCURRENT",
        );
        set_parsed(&mut config.log_retention_days, "SB_LOG_RETENTION_DAYS");
        set_parsed(&mut config.log_max_files, "SB_LOG_MAX_FILES");

        if let Some(value) = env_var("SB_FORCE_REQUIRE_SIGNATURE") {
            config.force_require_signature = matches!(value.as_str(), "1" | "true" | "yes");
        }

        config
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.spell_home.join("logs")
    }

    pub fn index_path(&self) -> PathBuf {
        self.logs_dir().join("index.json")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.logs_dir().join("tenant-audit.jsonl")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.spell_home.join("sbd.lock")
    }

    /// Engine view of this configuration.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            logs_dir: self.logs_dir(),
            request_body_limit_bytes: self.request_body_limit_bytes,
            execution_timeout_ms: self.execution_timeout_ms,
            rate_limit_window_ms: self.rate_limit_window_ms,
            rate_limit_max_requests: self.rate_limit_max_requests,
            tenant_rate_limit_window_ms: self.tenant_rate_limit_window_ms,
            tenant_rate_limit_max_requests: self.tenant_rate_limit_max_requests,
            max_concurrent_executions: self.max_concurrent_executions,
            tenant_max_concurrent_executions: self.tenant_max_concurrent_executions,
            log_retention_days: self.log_retention_days,
            log_max_files: self.log_max_files,
            force_require_signature: self.force_require_signature,
            runtime_interpreter: self.runtime_interpreter.clone(),
            runtime_cli_path: self.runtime_cli_path.clone(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, name: &str) {
    if let Some(raw) = env_var(name) {
        if let Ok(value) = raw.parse() {
            *slot = value;
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
