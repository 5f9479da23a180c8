//! Scenario: tenant isolation under keyed credentials.

use crate::prelude::*;
use serde_json::json;

const ADMIN_A: &str = "AAA-admin-token";
const USER_B: &str = "BBB-user-token";

async fn keyed_server() -> TestServer {
    TestServer::spawn_with(
        |_| SLEEP_STUB.to_string(),
        |config| {
            config.auth_tokens = Vec::new();
            config.auth_keys = vec![
                format!("a:admin={ADMIN_A}"),
                format!("b:user={USER_B}"),
            ];
        },
    )
    .await
}

#[tokio::test]
async fn admin_sees_cross_tenant_users_do_not() {
    let server = keyed_server().await;

    // One job in tenant b
    let response = server
        .post(
            "/spell-executions",
            Some(USER_B),
            &json!({"button_id": "hello"}),
            &[],
        )
        .await;
    assert_eq!(response.status(), 202);
    let b_job: serde_json::Value = response.json().await.unwrap();
    assert_eq!(b_job["tenant_id"], "b");

    // Admin of tenant a may list tenant b
    let response = server
        .get("/spell-executions?tenant_id=b", Some(ADMIN_A))
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["executions"].as_array().unwrap().len(), 1);
    assert_eq!(body["executions"][0]["tenant_id"], "b");

    // User b may not list tenant a
    let response = server
        .get("/spell-executions?tenant_id=a", Some(USER_B))
        .await;
    assert_error(response, 403, "TENANT_FORBIDDEN").await;

    // User b's unfiltered list is coerced to tenant b
    let response = server.get("/spell-executions", Some(USER_B)).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["filters"]["tenant_id"], "b");
    for job in body["executions"].as_array().unwrap() {
        assert_eq!(job["tenant_id"], "b");
    }
}

#[tokio::test]
async fn cross_tenant_cancel_is_forbidden() {
    let server = keyed_server().await;

    let response = server
        .post(
            "/spell-executions",
            Some(ADMIN_A),
            &json!({"button_id": "hello"}),
            &[],
        )
        .await;
    let a_job: serde_json::Value = response.json().await.unwrap();
    let id = a_job["execution_id"].as_str().unwrap();

    let response = server
        .post(
            &format!("/spell-executions/{id}/cancel"),
            Some(USER_B),
            &json!({}),
            &[],
        )
        .await;
    assert_error(response, 403, "TENANT_FORBIDDEN").await;
}

#[tokio::test]
async fn usage_endpoint_authorization() {
    let server = keyed_server().await;

    server
        .post(
            "/spell-executions",
            Some(USER_B),
            &json!({"button_id": "hello"}),
            &[],
        )
        .await;

    // Own tenant: allowed
    let response = server.get("/tenants/b/usage", Some(USER_B)).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["tenant_id"], "b");
    assert_eq!(body["usage"]["submissions_last_24h"], 1);
    let in_flight =
        body["usage"]["queued"].as_u64().unwrap() + body["usage"]["running"].as_u64().unwrap();
    assert_eq!(in_flight, 1);

    // Cross-tenant: admin only
    let response = server.get("/tenants/b/usage", Some(ADMIN_A)).await;
    assert_eq!(response.status(), 200);

    let response = server.get("/tenants/a/usage", Some(USER_B)).await;
    assert_error(response, 403, "ADMIN_ROLE_REQUIRED").await;

    // Malformed tenant id
    let response = server.get("/tenants/bad.tenant/usage", Some(ADMIN_A)).await;
    assert_error(response, 400, "INVALID_TENANT_ID").await;
}

#[tokio::test]
async fn role_policy_applies_to_buttons() {
    let server = keyed_server().await;

    let response = server
        .post(
            "/spell-executions",
            Some(USER_B),
            &json!({"button_id": "admin-only"}),
            &[],
        )
        .await;
    assert_error(response, 403, "ROLE_NOT_ALLOWED").await;

    let response = server
        .post(
            "/spell-executions",
            Some(ADMIN_A),
            &json!({"button_id": "admin-only"}),
            &[],
        )
        .await;
    assert_eq!(response.status(), 202);
}
