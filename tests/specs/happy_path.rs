//! Scenario: a registered button press runs to success with a receipt.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn press_runs_to_success_with_sanitized_receipt() {
    let server = TestServer::spawn_with(happy_stub, |_| {}).await;

    let accepted = server.press("hello").await;
    assert_eq!(accepted["ok"], true);
    assert_eq!(accepted["status"], "queued");
    assert_eq!(accepted["tenant_id"], "default");
    let execution_id = accepted["execution_id"].as_str().unwrap().to_string();
    assert!(execution_id.starts_with("exec_"));

    let body = server.wait_terminal(TOKEN, &execution_id).await;
    let execution = &body["execution"];
    assert_eq!(execution["status"], "succeeded");
    assert_eq!(execution["message"], "completed");
    assert_eq!(execution["runtime_execution_id"], "rt-1");
    assert!(execution["runtime_log_path"]
        .as_str()
        .unwrap()
        .ends_with("rt-1.json"));
    assert!(execution["started_at"].is_string());
    assert!(execution["finished_at"].is_string());

    // Receipt is projected: whitelisted fields only
    let receipt = &body["receipt"];
    assert_eq!(receipt["execution_id"], "rt-1");
    assert_eq!(receipt["id"], "samples/hello");
    assert_eq!(receipt["tenant_id"], "default");
    assert_eq!(receipt["steps"][0]["stepName"], "greet");
    for key in ["stdout", "stderr", "env", "secrets"] {
        assert!(
            receipt.get(key).is_none(),
            "receipt leaked top-level {key}"
        );
    }
    let step = receipt["steps"][0].as_object().unwrap();
    assert!(!step.contains_key("stdout"));
    assert!(!step.contains_key("env"));

    server.close().await;
}

#[tokio::test]
async fn output_endpoint_resolves_step_references() {
    let server = TestServer::spawn_with(happy_stub, |_| {}).await;
    let accepted = server.press("hello").await;
    let id = accepted["execution_id"].as_str().unwrap().to_string();
    server.wait_terminal(TOKEN, &id).await;

    let response = server
        .get(
            &format!("/spell-executions/{id}/output?path=step.greet.stdout"),
            Some(TOKEN),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["value"], "hi there");
    assert_eq!(body["path"], "step.greet.stdout");

    let response = server
        .get(
            &format!("/spell-executions/{id}/output?path=step.greet.json.msg"),
            Some(TOKEN),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["value"], "hi");

    // Misses and malformed paths
    let response = server
        .get(
            &format!("/spell-executions/{id}/output?path=step.nope.stdout"),
            Some(TOKEN),
        )
        .await;
    assert_error(response, 404, "OUTPUT_NOT_FOUND").await;

    let response = server
        .get(
            &format!("/spell-executions/{id}/output?path=nonsense"),
            Some(TOKEN),
        )
        .await;
    assert_error(response, 400, "INVALID_OUTPUT_PATH").await;
}

#[tokio::test]
async fn output_before_log_recorded_is_not_ready() {
    let server = TestServer::spawn_with(|_| SLEEP_STUB.to_string(), |_| {}).await;
    let accepted = server.press("hello").await;
    let id = accepted["execution_id"].as_str().unwrap();

    let response = server
        .get(
            &format!("/spell-executions/{id}/output?path=step.greet.stdout"),
            Some(TOKEN),
        )
        .await;
    assert_error(response, 409, "EXECUTION_NOT_READY").await;
}

#[tokio::test]
async fn buttons_listing_reflects_the_registry() {
    let server = TestServer::spawn().await;
    let response = server.get("/buttons", Some(TOKEN)).await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["version"], "spec-registry-1");
    let ids: Vec<&str> = body["buttons"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["button_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["hello", "danger", "admin-only"]);
}

#[tokio::test]
async fn dry_run_and_confirmations_are_snapshotted() {
    let server = TestServer::spawn_with(|_| SLEEP_STUB.to_string(), |_| {}).await;
    let response = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({
                "button_id": "danger",
                "dry_run": true,
                "confirmation": {"risk_acknowledged": true, "billing_acknowledged": true}
            }),
            &[],
        )
        .await;
    assert_eq!(response.status(), 202);
    let body: serde_json::Value = response.json().await.unwrap();
    let id = body["execution_id"].as_str().unwrap();

    let response = server
        .get(&format!("/spell-executions/{id}"), Some(TOKEN))
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    let request = &body["execution"]["request"];
    assert_eq!(request["dry_run"], true);
    assert_eq!(request["confirmation"]["risk_acknowledged"], true);
}
