// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution event stream (SSE).
//!
//! One `snapshot` event, then an `execution` event whenever the job's
//! projected snapshot changes, then exactly one `terminal` event once the
//! terminal state is durable, then the stream closes. A comment heartbeat
//! keeps NAT/proxy connections alive. Client disconnect drops the
//! receiver; the poll task notices on its next send and exits, so no
//! timers outlive the connection.

use axum::extract::{Path, Request, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use sb_core::{is_valid_execution_id, ErrorCode, Execution};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::{authorize, ApiError, AppDispatcher, AppState};

/// How often the poll task re-reads the job.
const POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Comment heartbeat period.
const HEARTBEAT: Duration = Duration::from_secs(15);

pub(crate) async fn events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let auth = authorize(&state, request.headers())?;
    if !is_valid_execution_id(&id) {
        return Err(ApiError::new(
            ErrorCode::InvalidExecutionId,
            "malformed execution id",
        ));
    }
    let job = state
        .dispatcher
        .get(&id)
        .ok_or_else(|| ApiError::new(ErrorCode::ExecutionNotFound, "no such execution"))?;
    if !auth.may_act_on(&job.tenant_id) {
        return Err(ApiError::new(
            ErrorCode::TenantForbidden,
            "execution belongs to another tenant",
        ));
    }

    let (tx, rx) = mpsc::channel::<Event>(16);
    tokio::spawn(poll_events(Arc::clone(&state.dispatcher), id, tx));

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(HEARTBEAT).text("ping"))
        .into_response())
}

/// Stable projection compared across polls.
fn snapshot_json(job: &Execution) -> String {
    serde_json::to_string(job).unwrap_or_default()
}

async fn poll_events(dispatcher: Arc<AppDispatcher>, id: String, tx: mpsc::Sender<Event>) {
    let Some(job) = dispatcher.get(&id) else {
        return;
    };
    let mut last = snapshot_json(&job);
    if tx
        .send(Event::default().event("snapshot").data(&last))
        .await
        .is_err()
    {
        return;
    }

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        // Pruned by retention mid-stream: nothing more to say
        let Some(job) = dispatcher.get(&id) else {
            return;
        };

        let current = snapshot_json(&job);
        if current != last {
            last = current.clone();
            if tx
                .send(Event::default().event("execution").data(&current))
                .await
                .is_err()
            {
                return;
            }
        }

        if job.is_terminal() && dispatcher.is_terminal_durable(&id) {
            let _ = tx
                .send(Event::default().event("terminal").data(&current))
                .await;
            return;
        }
    }
}
