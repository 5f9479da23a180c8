// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Button registry types.
//!
//! The registry is an external, read-only configuration source binding
//! symbolic button ids to a `(spell_id, version)` pair plus dispatch
//! policy. It is loaded once at startup and never written by the server.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Errors loading the registry file.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("registry {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("registry contains duplicate button_id {0}")]
    DuplicateButton(String),
}

/// Confirmations a button demands before dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredConfirmations {
    #[serde(default)]
    pub risk: bool,
    #[serde(default)]
    pub billing: bool,
}

/// One registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonEntry {
    pub button_id: String,
    pub spell_id: String,
    pub version: String,
    /// Default input merged under the caller's input
    #[serde(default = "default_input")]
    pub defaults: Value,
    #[serde(default)]
    pub required_confirmations: RequiredConfirmations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_signature: Option<bool>,
    /// Empty list means any role may press the button
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    /// None or empty means any tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tenants: Option<Vec<String>>,
}

fn default_input() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ButtonEntry {
    /// Role policy check; an empty allow-list is unrestricted.
    pub fn role_allowed(&self, role: Option<&str>) -> bool {
        if self.allowed_roles.is_empty() {
            return true;
        }
        role.map(|r| self.allowed_roles.iter().any(|a| a == r))
            .unwrap_or(false)
    }

    /// Tenant policy check; absent or empty allow-list is unrestricted.
    pub fn tenant_allowed(&self, tenant: &str) -> bool {
        match &self.allowed_tenants {
            Some(list) if !list.is_empty() => list.iter().any(|t| t == tenant),
            _ => true,
        }
    }
}

/// The loaded registry: ordered entries keyed by `button_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ButtonRegistry {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub buttons: Vec<ButtonEntry>,
}

impl ButtonRegistry {
    /// Load and validate the registry from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry: ButtonRegistry =
            serde_json::from_str(&text).map_err(|source| RegistryError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        let mut seen = std::collections::HashSet::new();
        for entry in &registry.buttons {
            if !seen.insert(entry.button_id.as_str()) {
                return Err(RegistryError::DuplicateButton(entry.button_id.clone()));
            }
        }
        Ok(registry)
    }

    /// Look up a button by id.
    pub fn get(&self, button_id: &str) -> Option<&ButtonEntry> {
        self.buttons.iter().find(|b| b.button_id == button_id)
    }
}

#[cfg(test)]
#[path = "button_tests.rs"]
mod tests;
