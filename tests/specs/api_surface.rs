//! Route-level contracts: auth, envelopes, limits, error codes.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn health_and_ui_are_anonymous() {
    let server = TestServer::spawn().await;

    let response = server.get("/health", None).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json; charset=utf-8"
    );
    assert!(response.headers().contains_key("content-length"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({"ok": true}));

    for path in ["/", "/ui"] {
        let response = server.get(path, None).await;
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("Spellboard"));
    }
    let response = server.get("/ui/app.js", None).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn protected_routes_demand_credentials() {
    let server = TestServer::spawn().await;

    let response = server.get("/buttons", None).await;
    assert_error(response, 401, "AUTH_REQUIRED").await;

    let response = server.get("/spell-executions", Some("wrong")).await;
    assert_error(response, 401, "AUTH_INVALID").await;

    let response = server.get("/tenants/default/usage", None).await;
    assert_error(response, 401, "AUTH_REQUIRED").await;
}

#[tokio::test]
async fn x_api_key_is_accepted() {
    let server = TestServer::spawn().await;
    let response = server
        .client
        .get(server.url("/buttons"))
        .header("X-Api-Key", TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn api_prefix_is_stripped() {
    let server = TestServer::spawn().await;
    let response = server.get("/api/health", None).await;
    assert_eq!(response.status(), 200);

    let response = server.get("/api/buttons", Some(TOKEN)).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn submit_error_codes() {
    let server = TestServer::spawn().await;

    let response = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "nope"}),
            &[],
        )
        .await;
    assert_error(response, 404, "BUTTON_NOT_FOUND").await;

    let response = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"input": {}}),
            &[],
        )
        .await;
    assert_error(response, 400, "BAD_REQUEST").await;

    let response = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "danger"}),
            &[],
        )
        .await;
    assert_error(response, 400, "RISK_CONFIRMATION_REQUIRED").await;
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let server = TestServer::spawn_with(
        |_| OK_STUB.to_string(),
        |config| config.request_body_limit_bytes = 256,
    )
    .await;

    let response = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "hello", "input": {"blob": "x".repeat(4096)}}),
            &[],
        )
        .await;
    assert_error(response, 413, "INPUT_TOO_LARGE").await;
}

#[tokio::test]
async fn rate_limit_surfaces_as_429() {
    let server = TestServer::spawn_with(
        |_| SLEEP_STUB.to_string(),
        |config| config.rate_limit_max_requests = 1,
    )
    .await;

    let first = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "hello"}),
            &[],
        )
        .await;
    assert_eq!(first.status(), 202);

    let second = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "hello"}),
            &[],
        )
        .await;
    assert_error(second, 429, "RATE_LIMITED").await;
}

#[tokio::test]
async fn concurrency_cap_surfaces_as_429() {
    let server = TestServer::spawn_with(
        |_| SLEEP_STUB.to_string(),
        |config| config.max_concurrent_executions = 1,
    )
    .await;

    let first = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "hello"}),
            &[],
        )
        .await;
    assert_eq!(first.status(), 202);

    let second = server
        .post(
            "/spell-executions",
            Some(TOKEN),
            &json!({"button_id": "hello"}),
            &[],
        )
        .await;
    assert_error(second, 429, "CONCURRENCY_LIMITED").await;
}

#[tokio::test]
async fn execution_lookup_errors() {
    let server = TestServer::spawn().await;

    let response = server
        .get("/spell-executions/exec_1_missing", Some(TOKEN))
        .await;
    assert_error(response, 404, "EXECUTION_NOT_FOUND").await;

    let response = server
        .get("/spell-executions/bad*id", Some(TOKEN))
        .await;
    assert_error(response, 400, "INVALID_EXECUTION_ID").await;
}

#[tokio::test]
async fn invalid_list_query_is_400() {
    let server = TestServer::spawn().await;

    let response = server
        .get("/spell-executions?status=melting", Some(TOKEN))
        .await;
    assert_error(response, 400, "INVALID_QUERY").await;

    let response = server.get("/spell-executions?limit=0", Some(TOKEN)).await;
    assert_error(response, 400, "INVALID_QUERY").await;
}

#[tokio::test]
async fn list_echoes_effective_filters() {
    let server = TestServer::spawn().await;
    let response = server
        .get("/spell-executions?status=queued,running&limit=5", Some(TOKEN))
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["filters"]["limit"], 5);
    assert_eq!(body["filters"]["status"], json!(["queued", "running"]));
    assert_eq!(body["filters"]["tenant_id"], "default");
}

#[tokio::test]
async fn unknown_routes_get_a_json_404() {
    let server = TestServer::spawn().await;
    let response = server.get("/no/such/route", None).await;
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], false);
}
