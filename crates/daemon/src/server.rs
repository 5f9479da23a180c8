// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server lifecycle: startup, recovery, serving, graceful shutdown.
//!
//! Startup order matters: lock the state directory, load the registry
//! and credentials, load and recover the index (in-flight jobs from a
//! previous process become `SERVER_RESTARTED` failures), persist the
//! recovered index, run the boot GC pass, then start listening.

use fs2::FileExt;
use sb_core::{ButtonRegistry, Clock, RegistryError, SystemClock, UuidIdGen};
use sb_engine::{AuthConfigError, AuthMode, Dispatcher};
use sb_storage::{load_index, recover_in_flight, AuditLog, IndexError, Persister};
use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::http::{self, AppDispatcher, AppState};

/// Errors that prevent the daemon from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Auth(#[from] AuthConfigError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("another sbd instance holds the lock at {0}")]
    AlreadyRunning(PathBuf),
}

/// A running dispatch server.
pub struct Server {
    addr: SocketAddr,
    dispatcher: Arc<AppDispatcher>,
    shutdown: Arc<Notify>,
    serve_task: JoinHandle<()>,
    _lock: File,
}

impl Server {
    /// Start the server; returns once the listener is bound.
    pub async fn start(config: Config) -> Result<Self, ServerError> {
        std::fs::create_dir_all(config.logs_dir())?;

        // Single instance per spell_home: two dispatchers sharing one
        // index.json would corrupt each other's writes.
        let lock = File::create(config.lock_path())?;
        if lock.try_lock_exclusive().is_err() {
            return Err(ServerError::AlreadyRunning(config.lock_path()));
        }

        let registry = if config.registry_path.exists() {
            ButtonRegistry::load(&config.registry_path)?
        } else {
            warn!(
                path = %config.registry_path.display(),
                "button registry not found; starting with an empty registry",
            );
            ButtonRegistry::default()
        };
        let auth = AuthMode::from_config(&config.auth_tokens, &config.auth_keys)?;

        let clock = SystemClock;
        let mut executions = load_index(&config.index_path())?;
        let recovered = recover_in_flight(&mut executions, clock.now_utc());
        let persister = Persister::spawn(config.index_path());
        if recovered > 0 {
            info!(recovered, "reaped in-flight executions from previous run");
            if let Err(e) = persister.persist(executions.clone(), clock.now_utc()).await {
                warn!(error = %e, "failed to persist recovered index");
            }
        }

        let audit = AuditLog::new(config.audit_path());
        let dispatcher = Dispatcher::new(
            config.dispatch_config(),
            registry,
            clock,
            UuidIdGen,
            persister,
            audit,
            executions,
        );
        dispatcher.run_gc().await;

        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        let addr = listener.local_addr()?;

        let app = http::router(AppState {
            dispatcher: Arc::clone(&dispatcher),
            auth,
        });
        let shutdown = Arc::new(Notify::new());
        let signal = {
            let shutdown = Arc::clone(&shutdown);
            async move {
                shutdown.notified().await;
            }
        };
        let serve_task = tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "http server error");
            }
        });

        info!(%addr, "sbd listening");
        Ok(Server {
            addr,
            dispatcher,
            shutdown,
            serve_task,
            _lock: lock,
        })
    }

    /// Bound address (useful with `port: 0`).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop the listener, then await all supervisor tasks. In-flight
    /// children are not killed; the next boot reaps their records.
    pub async fn close(self) {
        self.shutdown.notify_one();
        let _ = self.serve_task.await;
        self.dispatcher.shutdown().await;
        info!("sbd stopped");
    }
}
