//! Scenario: a failed run is retried and the chain is linked.

use crate::prelude::*;
use serde_json::json;
use std::path::Path;

fn fail_once_stub(logs_dir: &Path) -> String {
    let marker = logs_dir.join("attempted").display().to_string();
    format!(
        "#!/bin/sh\n\
         if [ -f '{marker}' ]; then exit 0; fi\n\
         touch '{marker}'\n\
         echo 'STEP_TIMEOUT in step deploy' >&2\n\
         exit 1\n"
    )
}

#[tokio::test]
async fn retry_chain_links_both_jobs() {
    let server = TestServer::spawn_with(fail_once_stub, |_| {}).await;

    let accepted = server.press("hello").await;
    let source_id = accepted["execution_id"].as_str().unwrap().to_string();

    let failed = server.wait_terminal(TOKEN, &source_id).await;
    assert_eq!(failed["execution"]["status"], "failed");
    assert_eq!(failed["execution"]["error_code"], "STEP_TIMEOUT");

    let response = server
        .post(
            &format!("/spell-executions/{source_id}/retry"),
            Some(TOKEN),
            &json!({}),
            &[],
        )
        .await;
    assert_eq!(response.status(), 202);
    let retry: serde_json::Value = response.json().await.unwrap();
    assert_eq!(retry["retry_of"], source_id.as_str());
    assert_eq!(retry["status"], "queued");
    let retry_id = retry["execution_id"].as_str().unwrap().to_string();
    assert_ne!(retry_id, source_id);

    let retried = server.wait_terminal(TOKEN, &retry_id).await;
    assert_eq!(retried["execution"]["status"], "succeeded");
    assert_eq!(retried["execution"]["retry_of"], source_id.as_str());

    // The source keeps its failure and gains the back-link
    let source = server
        .get(&format!("/spell-executions/{source_id}"), Some(TOKEN))
        .await;
    let source: serde_json::Value = source.json().await.unwrap();
    assert_eq!(source["execution"]["status"], "failed");
    assert_eq!(source["execution"]["retried_by"], retry_id.as_str());

    // The succeeded list contains the retry, not the source
    let response = server
        .get("/spell-executions?status=succeeded", Some(TOKEN))
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    let ids: Vec<&str> = body["executions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["execution_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![retry_id.as_str()]);

    server.close().await;
}

#[tokio::test]
async fn successful_runs_are_not_retryable() {
    let server = TestServer::spawn().await;
    let accepted = server.press("hello").await;
    let id = accepted["execution_id"].as_str().unwrap().to_string();
    server.wait_terminal(TOKEN, &id).await;

    let response = server
        .post(
            &format!("/spell-executions/{id}/retry"),
            Some(TOKEN),
            &json!({}),
            &[],
        )
        .await;
    assert_error(response, 409, "NOT_RETRYABLE").await;
}
