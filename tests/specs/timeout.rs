//! Scenario: the watchdog times out a slow cast run.

use crate::prelude::*;

#[tokio::test]
async fn slow_runtime_is_marked_timeout() {
    let server = TestServer::spawn_with(
        |_| SLEEP_STUB.to_string(),
        |config| config.execution_timeout_ms = 50,
    )
    .await;

    let accepted = server.press("hello").await;
    let id = accepted["execution_id"].as_str().unwrap().to_string();

    let body = server.wait_terminal(TOKEN, &id).await;
    let execution = &body["execution"];
    assert_eq!(execution["status"], "timeout");
    assert_eq!(execution["error_code"], "EXECUTION_TIMEOUT");
    assert!(
        execution["message"].as_str().unwrap().contains("50ms"),
        "message should name the timeout: {}",
        execution["message"]
    );

    server.close().await;
}
