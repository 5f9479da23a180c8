//! Scenario: idempotent submission, replay and conflict.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn replay_returns_the_same_execution() {
    let server = TestServer::spawn_with(|_| SLEEP_STUB.to_string(), |_| {}).await;
    let body = json!({"button_id": "hello", "input": {"x": 1}});

    let first = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &body,
            &[("Idempotency-Key", "k1")],
        )
        .await;
    assert_eq!(first.status(), 202);
    let first: serde_json::Value = first.json().await.unwrap();
    assert!(first.get("idempotent_replay").is_none());

    let second = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &body,
            &[("Idempotency-Key", "k1")],
        )
        .await;
    assert_eq!(second.status(), 202);
    let second: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second["idempotent_replay"], true);
    assert_eq!(second["execution_id"], first["execution_id"]);

    // Same key, different body: conflict
    let third = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "hello", "input": {"x": 2}}),
            &[("Idempotency-Key", "k1")],
        )
        .await;
    assert_error(third, 409, "IDEMPOTENCY_CONFLICT").await;
}

#[tokio::test]
async fn key_order_in_input_does_not_change_the_fingerprint() {
    let server = TestServer::spawn_with(|_| SLEEP_STUB.to_string(), |_| {}).await;

    let first = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "hello", "input": {"a": 1, "b": 2}}),
            &[("Idempotency-Key", "k2")],
        )
        .await;
    let first: serde_json::Value = first.json().await.unwrap();

    let second = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "hello", "input": {"b": 2, "a": 1}}),
            &[("Idempotency-Key", "k2")],
        )
        .await;
    assert_eq!(second.status(), 202);
    let second: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second["idempotent_replay"], true);
    assert_eq!(second["execution_id"], first["execution_id"]);
}

#[tokio::test]
async fn malformed_idempotency_key_is_rejected() {
    let server = TestServer::spawn().await;
    let response = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "hello"}),
            &[("Idempotency-Key", "   ")],
        )
        .await;
    assert_error(response, 400, "BAD_REQUEST").await;
}
