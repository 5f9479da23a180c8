// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-writer persistence queue for the execution index.
//!
//! All index writes flow through one task consuming a command channel, so
//! the file on disk always reflects a prefix of the transitions observed
//! in memory — two concurrent transitions can never interleave into a
//! torn or reordered file. Callers receive a completion handle and await
//! it when ordering matters (e.g. a POST response must not return before
//! the queued job is durable).

use crate::index::{IndexError, IndexFile};
use chrono::{DateTime, Utc};
use sb_core::Execution;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// Errors surfaced to persist callers.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("persister task is gone")]
    Closed,
    #[error(transparent)]
    Index(#[from] IndexError),
}

struct PersistCommand {
    snapshot: Vec<Execution>,
    updated_at: DateTime<Utc>,
    done: oneshot::Sender<Result<(), IndexError>>,
}

/// The dedicated writer task.
pub struct Persister;

impl Persister {
    /// Spawn the writer task; returns the handle used to enqueue writes.
    pub fn spawn(index_path: PathBuf) -> PersisterHandle {
        let (tx, mut rx) = mpsc::channel::<PersistCommand>(64);

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                let path = index_path.clone();
                let file = IndexFile::new(cmd.updated_at, cmd.snapshot);
                let result = tokio::task::spawn_blocking(move || file.save(&path))
                    .await
                    .unwrap_or_else(|join_err| {
                        Err(IndexError::Io(std::io::Error::other(join_err)))
                    });

                if let Err(e) = &result {
                    error!(error = %e, "index persist failed");
                } else {
                    debug!("index persisted");
                }
                let _ = cmd.done.send(result);
            }
        });

        PersisterHandle { tx }
    }
}

/// Cheaply cloneable handle onto the persister queue.
#[derive(Clone)]
pub struct PersisterHandle {
    tx: mpsc::Sender<PersistCommand>,
}

impl PersisterHandle {
    /// Enqueue a full-index write and wait for it to be durable.
    pub async fn persist(
        &self,
        snapshot: Vec<Execution>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), PersistError> {
        let (done, ack) = oneshot::channel();
        self.tx
            .send(PersistCommand {
                snapshot,
                updated_at,
                done,
            })
            .await
            .map_err(|_| PersistError::Closed)?;
        ack.await.map_err(|_| PersistError::Closed)??;
        Ok(())
    }
}

#[cfg(test)]
#[path = "persister_tests.rs"]
mod tests;
