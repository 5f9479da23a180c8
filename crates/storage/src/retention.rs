// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log-retention garbage collection.
//!
//! Planning is a pure function over (directory contents, job index,
//! policy): files and index entries are marked by age and count, and any
//! log file still referenced by a retained job is spared regardless of
//! the two rules. Applying the same plan twice is a no-op.

use chrono::{DateTime, Duration, Utc};
use sb_core::Execution;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A candidate log file with its modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileInfo {
    pub path: PathBuf,
    pub mtime: DateTime<Utc>,
}

/// Retention thresholds; zero disables the corresponding rule.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub retention_days: u32,
    pub max_files: u32,
}

/// What the planner decided to remove.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionPlan {
    pub delete_files: Vec<PathBuf>,
    pub delete_jobs: Vec<String>,
}

impl RetentionPlan {
    pub fn is_empty(&self) -> bool {
        self.delete_files.is_empty() && self.delete_jobs.is_empty()
    }
}

/// Collect `*.json` candidates under the logs directory, except the index.
pub fn scan_log_files(logs_dir: &Path) -> Vec<LogFileInfo> {
    let entries = match std::fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some("index.json") {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        files.push(LogFileInfo {
            path,
            mtime: modified.into(),
        });
    }
    files
}

/// Age rule + count rule over a list of (key, time) pairs.
///
/// Returns the keys to delete. `survivors` are sorted newest-first before
/// the count rule applies.
fn mark_by_age_and_count<K: Clone>(
    items: &[(K, DateTime<Utc>)],
    now: DateTime<Utc>,
    policy: RetentionPolicy,
) -> Vec<K> {
    let mut deleted = Vec::new();
    let mut survivors: Vec<&(K, DateTime<Utc>)> = Vec::new();

    if policy.retention_days > 0 {
        let cutoff = now - Duration::days(policy.retention_days as i64);
        for item in items {
            if item.1 < cutoff {
                deleted.push(item.0.clone());
            } else {
                survivors.push(item);
            }
        }
    } else {
        survivors.extend(items.iter());
    }

    if policy.max_files > 0 && survivors.len() > policy.max_files as usize {
        survivors.sort_by(|a, b| b.1.cmp(&a.1));
        for item in &survivors[policy.max_files as usize..] {
            deleted.push(item.0.clone());
        }
    }

    deleted
}

/// Build a retention plan.
///
/// In-flight jobs are never candidates: they have live supervisors, and
/// their receipts do not exist yet. Files referenced by retained jobs are
/// spared even when the age/count rules picked them, which keeps receipt
/// linkage intact across runtime-execution-id collisions.
pub fn plan_retention(
    files: &[LogFileInfo],
    executions: &[Execution],
    now: DateTime<Utc>,
    policy: RetentionPolicy,
) -> RetentionPlan {
    let file_items: Vec<(PathBuf, DateTime<Utc>)> =
        files.iter().map(|f| (f.path.clone(), f.mtime)).collect();
    let mut delete_files: HashSet<PathBuf> =
        mark_by_age_and_count(&file_items, now, policy).into_iter().collect();

    let job_items: Vec<(String, DateTime<Utc>)> = executions
        .iter()
        .filter(|job| job.is_terminal())
        .map(|job| (job.execution_id.clone(), job.anchor_time()))
        .collect();
    let delete_jobs: Vec<String> = mark_by_age_and_count(&job_items, now, policy);

    // Paths still referenced by retained jobs survive.
    let deleted_job_ids: HashSet<&String> = delete_jobs.iter().collect();
    let referenced: HashSet<PathBuf> = executions
        .iter()
        .filter(|job| !deleted_job_ids.contains(&job.execution_id))
        .filter_map(|job| job.runtime_log_path.as_ref())
        .map(PathBuf::from)
        .collect();
    delete_files.retain(|path| !referenced.contains(path));

    let mut delete_files: Vec<PathBuf> = delete_files.into_iter().collect();
    delete_files.sort();
    RetentionPlan {
        delete_files,
        delete_jobs,
    }
}

/// Remove the planned files; best-effort, returns the number removed.
pub fn delete_files(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "pruned runtime log");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to prune runtime log"),
        }
    }
    removed
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
