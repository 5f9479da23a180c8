//! Scenario: the execution event stream.

use crate::prelude::*;
use std::path::Path;
use std::time::{Duration, Instant};

fn slow_ok_stub(_logs_dir: &Path) -> String {
    "#!/bin/sh\nsleep 0.3\nexit 0\n".to_string()
}

/// Read the SSE body until the terminal event (or time out).
async fn read_stream(mut response: reqwest::Response) -> String {
    let mut collected = String::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_secs(2), response.chunk()).await {
            Ok(Ok(Some(chunk))) => {
                collected.push_str(&String::from_utf8_lossy(&chunk));
                if collected.contains("event: terminal") {
                    // The server closes shortly after; drain what's left
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(_)) | Err(_) => break,
        }
    }
    collected
}

#[tokio::test]
async fn stream_emits_snapshot_then_updates_then_terminal() {
    let server = TestServer::spawn_with(slow_ok_stub, |_| {}).await;
    let accepted = server.press("hello").await;
    let id = accepted["execution_id"].as_str().unwrap().to_string();

    let response = server
        .get(&format!("/spell-executions/{id}/events"), Some(TOKEN))
        .await;
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = read_stream(response).await;

    let snapshot_at = body.find("event: snapshot").expect("snapshot event");
    let terminal_at = body.find("event: terminal").expect("terminal event");
    assert!(snapshot_at < terminal_at, "snapshot precedes terminal");
    assert_eq!(
        body.matches("event: terminal").count(),
        1,
        "terminal exactly once"
    );
    // The run transitions at least once (running and/or terminal update)
    assert!(body.contains("event: execution"), "at least one delta");
    assert!(body.contains("\"status\":\"succeeded\""));

    server.close().await;
}

#[tokio::test]
async fn stream_for_finished_execution_closes_after_terminal() {
    let server = TestServer::spawn().await;
    let accepted = server.press("hello").await;
    let id = accepted["execution_id"].as_str().unwrap().to_string();
    server.wait_terminal(TOKEN, &id).await;

    let response = server
        .get(&format!("/spell-executions/{id}/events"), Some(TOKEN))
        .await;
    let body = read_stream(response).await;

    assert!(body.contains("event: snapshot"));
    assert_eq!(body.matches("event: terminal").count(), 1);
}

#[tokio::test]
async fn stream_requires_auth_and_a_known_execution() {
    let server = TestServer::spawn().await;

    let response = server.get("/spell-executions/exec_1_x/events", None).await;
    assert_error(response, 401, "AUTH_REQUIRED").await;

    let response = server
        .get("/spell-executions/exec_1_missing/events", Some(TOKEN))
        .await;
    assert_error(response, 404, "EXECUTION_NOT_FOUND").await;
}
