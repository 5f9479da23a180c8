// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process supervision for cast runs.
//!
//! One supervisor task owns each in-flight execution: it writes the
//! merged input to a scoped temp directory, spawns the cast CLI, pipes
//! stdout/stderr through bounded buffers, enforces the wall-clock
//! timeout, honours cancellation, and reports the terminal outcome back
//! to the lifecycle engine. The temp directory is released on every exit
//! path via RAII.

use chrono::{DateTime, Duration, Utc};
use sb_core::{classify, Clock, ErrorCode, ExecutionStatus, IdGen};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lifecycle::{Dispatcher, RunContext, RuntimeArtifacts, TerminalOutcome};
use crate::receipt_loader::{load_receipt, read_runtime_log};

/// Retained bytes per captured stream.
const CAPTURE_LIMIT: usize = 64 * 1024;

/// How far before `started_at` an inferred log's mtime may fall.
const INFERENCE_SLACK_MS: i64 = 1_000;

enum ChildExit {
    Status(std::process::ExitStatus),
    WaitFailed(String),
    TimedOut,
    Canceled,
}

/// Supervise one execution from queued to terminal.
pub(crate) async fn supervise<C: Clock + 'static, G: IdGen + 'static>(
    dispatcher: Arc<Dispatcher<C, G>>,
    execution_id: String,
    cancel: CancellationToken,
) {
    // Cancel observed before the running transition: leave the canceled
    // record alone and never spawn.
    if cancel.is_cancelled() {
        dispatcher.release(&execution_id);
        return;
    }
    let Some(ctx) = dispatcher.begin_running(&execution_id).await else {
        dispatcher.release(&execution_id);
        return;
    };
    if cancel.is_cancelled() {
        dispatcher
            .finish(&execution_id, None, RuntimeArtifacts::default())
            .await;
        return;
    }

    let (outcome, artifacts) = run_child(&dispatcher, &execution_id, &ctx, &cancel).await;
    dispatcher.finish(&execution_id, outcome, artifacts).await;
}

async fn run_child<C: Clock + 'static, G: IdGen + 'static>(
    dispatcher: &Arc<Dispatcher<C, G>>,
    execution_id: &str,
    ctx: &RunContext,
    cancel: &CancellationToken,
) -> (Option<TerminalOutcome>, RuntimeArtifacts) {
    let config = dispatcher.config();

    // Scoped input directory; dropped (and deleted) on every return path
    let tmp = match tempfile::Builder::new().prefix("spellboard-").tempdir() {
        Ok(tmp) => tmp,
        Err(e) => {
            return (
                Some(failed(format!("could not create input directory: {e}"))),
                RuntimeArtifacts::default(),
            );
        }
    };
    let input_path = tmp.path().join("input.json");
    let input_bytes = match serde_json::to_vec_pretty(&ctx.input) {
        Ok(bytes) => bytes,
        Err(e) => {
            return (
                Some(failed(format!("could not serialise input: {e}"))),
                RuntimeArtifacts::default(),
            );
        }
    };
    if let Err(e) = std::fs::write(&input_path, input_bytes) {
        return (
            Some(failed(format!("could not write input file: {e}"))),
            RuntimeArtifacts::default(),
        );
    }

    let args = build_cast_args(&config.runtime_cli_path, ctx, &input_path);
    debug!(execution_id, interpreter = %config.runtime_interpreter, ?args, "spawning cast");

    let mut child = match Command::new(&config.runtime_interpreter)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return (
                Some(failed(format!("failed to spawn cast runtime: {e}"))),
                RuntimeArtifacts::default(),
            );
        }
    };

    let stdout_task = child
        .stdout
        .take()
        .map(|stream| tokio::spawn(read_capped(stream, CAPTURE_LIMIT)));
    let stderr_task = child
        .stderr
        .take()
        .map(|stream| tokio::spawn(read_capped(stream, CAPTURE_LIMIT)));

    let timeout = std::time::Duration::from_millis(config.execution_timeout_ms);
    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => ChildExit::Status(status),
            Err(e) => ChildExit::WaitFailed(e.to_string()),
        },
        _ = tokio::time::sleep(timeout) => {
            if let Some(pid) = child.id() {
                sigterm(pid);
            }
            let _ = child.wait().await;
            ChildExit::TimedOut
        }
        _ = cancel.cancelled() => {
            if let Some(pid) = child.id() {
                sigterm(pid);
            }
            let _ = child.wait().await;
            ChildExit::Canceled
        }
    };

    let stdout = join_capture(stdout_task).await;
    let stderr = join_capture(stderr_task).await;

    let canceled = matches!(exit, ChildExit::Canceled);
    let (mut runtime_execution_id, mut runtime_log_path) = parse_stdout_fields(&stdout);
    if runtime_log_path.is_none() && !canceled {
        if let Some(path) = infer_log_path(
            &config.logs_dir,
            &ctx.spell_id,
            &ctx.version,
            ctx.started_at,
        ) {
            debug!(execution_id, path = %path.display(), "inferred runtime log from disk");
            runtime_log_path = Some(path.display().to_string());
        }
    }

    let receipt = runtime_log_path
        .as_deref()
        .and_then(|path| load_receipt(Path::new(path), &ctx.tenant_id));
    if runtime_execution_id.is_none() {
        runtime_execution_id = receipt.as_ref().and_then(|r| r.execution_id.clone());
    }

    let rollback_incomplete = receipt
        .as_ref()
        .map(|r| r.rollback_incomplete())
        .unwrap_or(false);

    let outcome = match exit {
        ChildExit::Canceled => None,
        ChildExit::TimedOut => Some(TerminalOutcome {
            status: ExecutionStatus::Timeout,
            error_code: Some(ErrorCode::ExecutionTimeout),
            message: Some(format!(
                "execution timed out after {}ms",
                config.execution_timeout_ms
            )),
        }),
        ChildExit::WaitFailed(message) => Some(failed(format!("cast runtime lost: {message}"))),
        ChildExit::Status(status) if status.success() => {
            if rollback_incomplete {
                Some(compensation_incomplete())
            } else {
                Some(TerminalOutcome {
                    status: ExecutionStatus::Succeeded,
                    error_code: None,
                    message: Some("completed".to_string()),
                })
            }
        }
        ChildExit::Status(_) => {
            if rollback_incomplete {
                Some(compensation_incomplete())
            } else {
                let failure = classify(&stderr, &stdout);
                Some(TerminalOutcome {
                    status: ExecutionStatus::Failed,
                    error_code: Some(failure.code),
                    message: Some(failure.message),
                })
            }
        }
    };

    (
        outcome,
        RuntimeArtifacts {
            runtime_execution_id,
            runtime_log_path,
            receipt,
        },
    )
}

fn failed(message: String) -> TerminalOutcome {
    TerminalOutcome {
        status: ExecutionStatus::Failed,
        error_code: Some(ErrorCode::ExecutionFailed),
        message: Some(message),
    }
}

fn compensation_incomplete() -> TerminalOutcome {
    TerminalOutcome {
        status: ExecutionStatus::Failed,
        error_code: Some(ErrorCode::CompensationIncomplete),
        message: Some("rollback incomplete; manual recovery required".to_string()),
    }
}

/// Command line for one cast invocation (without the interpreter).
pub(crate) fn build_cast_args(cli: &Path, ctx: &RunContext, input_path: &Path) -> Vec<String> {
    let mut args = vec![
        cli.display().to_string(),
        "cast".to_string(),
        ctx.spell_id.clone(),
        "--version".to_string(),
        ctx.version.clone(),
        "--input".to_string(),
        input_path.display().to_string(),
    ];
    if ctx.dry_run {
        args.push("--dry-run".to_string());
    }
    if ctx.confirmation.risk_acknowledged {
        args.push("--yes".to_string());
    }
    if ctx.confirmation.billing_acknowledged {
        args.push("--allow-billing".to_string());
    }
    if ctx.require_signature {
        args.push("--require-signature".to_string());
    } else {
        args.push("--allow-unsigned".to_string());
    }
    args
}

/// Pull `execution_id: <id>` and `log: <path>` lines out of stdout.
pub(crate) fn parse_stdout_fields(stdout: &str) -> (Option<String>, Option<String>) {
    let mut execution_id = None;
    let mut log_path = None;
    for line in stdout.lines() {
        let line = line.trim();
        if execution_id.is_none() {
            if let Some(rest) = line.strip_prefix("execution_id:") {
                let rest = rest.trim();
                if !rest.is_empty() {
                    execution_id = Some(rest.to_string());
                }
                continue;
            }
        }
        if log_path.is_none() {
            if let Some(rest) = line.strip_prefix("log:") {
                let rest = rest.trim();
                if !rest.is_empty() {
                    log_path = Some(rest.to_string());
                }
            }
        }
    }
    (execution_id, log_path)
}

/// Best-effort fallback when the runtime printed no `log:` line: newest
/// `*.json` in the logs directory written around or after `started_at`
/// whose content matches this spell and version. The stdout line remains
/// the authoritative signal.
pub(crate) fn infer_log_path(
    logs_dir: &Path,
    spell_id: &str,
    version: &str,
    started_at: DateTime<Utc>,
) -> Option<PathBuf> {
    let floor = started_at - Duration::milliseconds(INFERENCE_SLACK_MS);
    let mut candidates = sb_storage::scan_log_files(logs_dir);
    candidates.retain(|f| f.mtime >= floor);
    candidates.sort_by(|a, b| b.mtime.cmp(&a.mtime));

    for candidate in candidates {
        let Some(log) = read_runtime_log(&candidate.path) else {
            continue;
        };
        let id_matches = log.get("id").and_then(|v| v.as_str()) == Some(spell_id);
        let version_matches = log.get("version").and_then(|v| v.as_str()) == Some(version);
        if id_matches && version_matches {
            return Some(candidate.path);
        }
    }
    None
}

/// Read a stream to EOF, retaining only the first `cap` bytes.
async fn read_capped<R: tokio::io::AsyncRead + Unpin>(mut reader: R, cap: usize) -> String {
    let mut kept: Vec<u8> = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if kept.len() < cap {
                    let take = (cap - kept.len()).min(n);
                    kept.extend_from_slice(&buf[..take]);
                }
                // Past the cap we keep draining so the child never blocks
            }
        }
    }
    String::from_utf8_lossy(&kept).into_owned()
}

async fn join_capture(task: Option<tokio::task::JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

fn sigterm(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %e, "failed to SIGTERM cast child");
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
