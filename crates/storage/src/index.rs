// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution index persistence.
//!
//! The index file mirrors the in-memory execution map:
//! `{"version":"v1","updated_at":"<iso>","executions":[…]}`, pretty-printed
//! with a trailing newline. Writes are atomic (tmp + fsync + rename) so a
//! crash mid-write never corrupts the file; a corrupt file found at load
//! is rotated to a `.bak` and the server starts with an empty index.

use chrono::{DateTime, Utc};
use sb_core::{ErrorCode, Execution, ExecutionStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Schema version written to and accepted from disk.
pub const INDEX_VERSION: &str = "v1";

/// Errors from index persistence.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk shape of the execution index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub version: String,
    pub updated_at: DateTime<Utc>,
    pub executions: Vec<Execution>,
}

impl IndexFile {
    pub fn new(updated_at: DateTime<Utc>, executions: Vec<Execution>) -> Self {
        Self {
            version: INDEX_VERSION.to_string(),
            updated_at,
            executions,
        }
    }

    /// Save atomically: write `.tmp`, fsync, rename.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            let mut body = serde_json::to_string_pretty(self)?;
            body.push('\n');
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load the raw file if present.
    ///
    /// Returns `Ok(None)` when the file doesn't exist, is corrupt, or has
    /// an unknown schema version. Corrupt files are moved to a `.bak` so
    /// the server can start with a clean slate.
    pub fn load(path: &Path) -> Result<Option<Self>, IndexError> {
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        match serde_json::from_reader::<_, IndexFile>(reader) {
            Ok(index) if index.version == INDEX_VERSION => Ok(Some(index)),
            Ok(index) => {
                let bak_path = rotate_bak_path(path);
                warn!(
                    version = %index.version,
                    path = %path.display(),
                    bak = %bak_path.display(),
                    "Unknown index schema version, moving aside and starting fresh",
                );
                fs::rename(path, &bak_path)?;
                Ok(None)
            }
            Err(e) => {
                let bak_path = rotate_bak_path(path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak_path.display(),
                    "Corrupt index, moving to .bak and starting fresh",
                );
                fs::rename(path, &bak_path)?;
                Ok(None)
            }
        }
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

/// Load executions from the index file, dropping invalid records.
///
/// Duplicated execution ids keep their first occurrence; structurally
/// invalid records are skipped with a warning rather than poisoning the
/// whole index.
pub fn load_index(path: &Path) -> Result<Vec<Execution>, IndexError> {
    let Some(index) = IndexFile::load(path)? else {
        return Ok(Vec::new());
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut executions = Vec::with_capacity(index.executions.len());
    for record in index.executions {
        if !record.is_structurally_valid() {
            warn!(
                execution_id = %record.execution_id,
                "Dropping structurally invalid index record",
            );
            continue;
        }
        if !seen.insert(record.execution_id.clone()) {
            warn!(
                execution_id = %record.execution_id,
                "Dropping duplicate index record",
            );
            continue;
        }
        executions.push(record);
    }
    Ok(executions)
}

/// Boot recovery: rewrite jobs left in flight by a previous process.
///
/// Runtime state (supervisor tasks, child handles) does not survive a
/// restart, so every `queued`/`running` record becomes a failure with
/// `SERVER_RESTARTED`. Returns the number of records rewritten.
pub fn recover_in_flight(executions: &mut [Execution], now: DateTime<Utc>) -> usize {
    let mut recovered = 0;
    for job in executions.iter_mut() {
        if job.status.is_in_flight() {
            job.status = ExecutionStatus::Failed;
            job.error_code = Some(ErrorCode::ServerRestarted);
            job.message = Some("server restarted while execution was in flight".to_string());
            job.finished_at = Some(now);
            recovered += 1;
        }
    }
    recovered
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
