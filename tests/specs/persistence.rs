//! Scenario: durable index, audit trail, restart recovery.

use crate::prelude::*;
use serde_json::{json, Value};

#[tokio::test]
async fn index_file_matches_the_promised_layout() {
    let server = TestServer::spawn().await;
    let accepted = server.press("hello").await;
    let id = accepted["execution_id"].as_str().unwrap().to_string();
    server.wait_terminal(TOKEN, &id).await;

    let text = std::fs::read_to_string(server.logs_dir.join("index.json")).unwrap();
    assert!(text.ends_with('\n'), "index must end with a newline");
    assert!(text.contains("\n  \"version\": \"v1\""), "index is pretty-printed");

    let index: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(index["version"], "v1");
    assert!(index["updated_at"].is_string());
    let ids: Vec<&str> = index["executions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["execution_id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&id.as_str()));

    server.close().await;
}

#[tokio::test]
async fn audit_log_records_lifecycle_transitions() {
    let server = TestServer::spawn().await;
    let accepted = server.press("hello").await;
    let id = accepted["execution_id"].as_str().unwrap().to_string();
    server.wait_terminal(TOKEN, &id).await;

    let text = std::fs::read_to_string(server.logs_dir.join("tenant-audit.jsonl")).unwrap();
    let records: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let statuses: Vec<&str> = records
        .iter()
        .filter(|r| r["execution_id"] == id.as_str())
        .map(|r| r["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["queued", "running", "succeeded"]);
    for record in &records {
        assert_eq!(record["tenant_id"], "default");
        assert_eq!(record["button_id"], "hello");
        assert!(record["ts"].is_string());
    }
}

#[tokio::test]
async fn in_flight_records_become_server_restarted_on_boot() {
    // Seed an index with a job a previous process left running
    let home = tempfile::tempdir().unwrap();
    let spell_home = home.path().join("spellboard");
    let logs_dir = spell_home.join("logs");
    std::fs::create_dir_all(&logs_dir).unwrap();
    std::fs::write(
        spell_home.join("buttons.json"),
        registry_json().to_string(),
    )
    .unwrap();
    std::fs::write(spell_home.join("cast-stub.sh"), OK_STUB).unwrap();
    std::fs::write(
        logs_dir.join("index.json"),
        json!({
            "version": "v1",
            "updated_at": "2026-08-01T00:00:00Z",
            "executions": [{
                "execution_id": "exec_1_aaaaaaaa",
                "button_id": "hello",
                "spell_id": "samples/hello",
                "version": "1.0.0",
                "require_signature": false,
                "status": "running",
                "tenant_id": "default",
                "created_at": "2026-08-01T00:00:00Z",
                "started_at": "2026-08-01T00:00:01Z"
            }]
        })
        .to_string(),
    )
    .unwrap();

    let mut config = sb_daemon::Config::default();
    config.port = 0;
    config.spell_home = spell_home.clone();
    config.registry_path = spell_home.join("buttons.json");
    config.runtime_interpreter = "/bin/sh".to_string();
    config.runtime_cli_path = spell_home.join("cast-stub.sh");
    config.auth_tokens = vec![TOKEN.to_string()];
    config.log_retention_days = 0;
    config.log_max_files = 0;
    let server = sb_daemon::Server::start(config).await.unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(format!(
            "http://127.0.0.1:{}/spell-executions/exec_1_aaaaaaaa",
            server.addr().port()
        ))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["execution"]["status"], "failed");
    assert_eq!(body["execution"]["error_code"], "SERVER_RESTARTED");
    assert!(body["execution"]["finished_at"].is_string());

    // The recovery is itself durable
    let text = std::fs::read_to_string(logs_dir.join("index.json")).unwrap();
    assert!(text.contains("SERVER_RESTARTED"));

    server.close().await;
}

#[tokio::test]
async fn second_instance_refuses_to_start() {
    let server = TestServer::spawn().await;

    let mut config = sb_daemon::Config::default();
    config.port = 0;
    config.spell_home = server.spell_home.clone();
    config.registry_path = server.spell_home.join("buttons.json");
    config.auth_tokens = vec![TOKEN.to_string()];

    let err = sb_daemon::Server::start(config).await;
    assert!(matches!(err, Err(sb_daemon::ServerError::AlreadyRunning(_))));

    server.close().await;
}
