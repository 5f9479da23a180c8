//! Shared harness for the sbd behavioral specs.

use sb_daemon::{Config, Server};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Opaque bearer token configured on every default test server.
pub const TOKEN: &str = "test-token";

pub const OK_STUB: &str = "#!/bin/sh\nexit 0\n";
pub const SLEEP_STUB: &str = "#!/bin/sh\nexec sleep 2\n";

/// Stub that writes a valid receipt into the logs directory and prints
/// the runtime's two stdout lines.
pub fn happy_stub(logs_dir: &Path) -> String {
    let log_path = logs_dir.join("rt-1.json").display().to_string();
    format!(
        "#!/bin/sh\n\
         cat > '{log_path}' <<'EOF'\n\
         {{\"execution_id\":\"rt-1\",\"id\":\"samples/hello\",\"version\":\"1.0.0\",\n\
          \"success\":true,\"summary\":{{\"steps\":1}},\n\
          \"steps\":[{{\"stepName\":\"greet\",\"success\":true,\"exitCode\":0,\"stdout\":\"raw\",\"env\":{{\"T\":\"x\"}}}}],\n\
          \"outputs\":{{\"greet\":{{\"stdout\":\"hi there\",\"json\":{{\"msg\":\"hi\"}}}}}},\n\
          \"stdout\":\"secret\",\"stderr\":\"secret\",\"env\":{{\"KEY\":\"v\"}},\"secrets\":{{\"k\":\"v\"}}}}\n\
         EOF\n\
         echo \"execution_id: rt-1\"\n\
         echo \"log: {log_path}\"\n\
         exit 0\n"
    )
}

pub fn registry_json() -> Value {
    json!({
        "version": "spec-registry-1",
        "buttons": [
            {
                "button_id": "hello",
                "spell_id": "samples/hello",
                "version": "1.0.0",
                "defaults": {"greeting": "hi"}
            },
            {
                "button_id": "danger",
                "spell_id": "samples/danger",
                "version": "2.0.0",
                "required_confirmations": {"risk": true, "billing": true}
            },
            {
                "button_id": "admin-only",
                "spell_id": "samples/locked",
                "version": "1.0.0",
                "allowed_roles": ["admin"]
            }
        ]
    })
}

/// One booted server over a throwaway spell_home.
pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    pub spell_home: PathBuf,
    pub logs_dir: PathBuf,
    server: Option<Server>,
    _home: TempDir,
}

impl TestServer {
    /// Default server: token auth, fast-exiting stub runtime.
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| OK_STUB.to_string(), |_| {}).await
    }

    /// Server with a custom stub (built from the logs dir) and config tweaks.
    pub async fn spawn_with(
        stub: impl FnOnce(&Path) -> String,
        tweak: impl FnOnce(&mut Config),
    ) -> Self {
        let home = tempfile::tempdir().unwrap();
        let spell_home = home.path().join("spellboard");
        let logs_dir = spell_home.join("logs");
        std::fs::create_dir_all(&logs_dir).unwrap();

        let registry_path = spell_home.join("buttons.json");
        std::fs::write(&registry_path, registry_json().to_string()).unwrap();

        let stub_path = spell_home.join("cast-stub.sh");
        std::fs::write(&stub_path, stub(&logs_dir)).unwrap();

        let mut config = Config::default();
        config.port = 0;
        config.spell_home = spell_home.clone();
        config.registry_path = registry_path;
        config.runtime_interpreter = "/bin/sh".to_string();
        config.runtime_cli_path = stub_path;
        config.auth_tokens = vec![TOKEN.to_string()];
        config.auth_keys = Vec::new();
        config.execution_timeout_ms = 10_000;
        config.rate_limit_max_requests = 1_000;
        config.tenant_rate_limit_max_requests = 1_000;
        config.max_concurrent_executions = 10;
        config.tenant_max_concurrent_executions = 10;
        config.log_retention_days = 0;
        config.log_max_files = 0;
        tweak(&mut config);

        let server = Server::start(config).await.unwrap();
        let base = format!("http://127.0.0.1:{}", server.addr().port());

        TestServer {
            base,
            client: reqwest::Client::new(),
            spell_home,
            logs_dir,
            server: Some(server),
            _home: home,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    pub async fn post(
        &self,
        path: &str,
        token: Option<&str>,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> reqwest::Response {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request.send().await.unwrap()
    }

    /// Press a button with the default token; asserts 202 and returns the body.
    pub async fn press(&self, button_id: &str) -> Value {
        let response = self
            .post(
                "/spell-executions",
                Some(TOKEN),
                &json!({"button_id": button_id}),
                &[],
            )
            .await;
        assert_eq!(response.status(), 202, "press should be accepted");
        response.json().await.unwrap()
    }

    /// Poll until the execution reaches a terminal status; returns it.
    pub async fn wait_terminal(&self, token: &str, execution_id: &str) -> Value {
        for _ in 0..1_000 {
            let response = self
                .get(&format!("/spell-executions/{execution_id}"), Some(token))
                .await;
            if response.status() == 200 {
                let body: Value = response.json().await.unwrap();
                let status = body["execution"]["status"].as_str().unwrap_or_default();
                if matches!(status, "succeeded" | "failed" | "timeout" | "canceled") {
                    return body;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("execution {execution_id} never reached a terminal status");
    }

    pub async fn close(mut self) {
        if let Some(server) = self.server.take() {
            server.close().await;
        }
    }
}

/// Error-envelope assertion helper.
pub async fn assert_error(response: reqwest::Response, status: u16, code: &str) -> Value {
    assert_eq!(response.status(), status);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error_code"], code);
    body
}
