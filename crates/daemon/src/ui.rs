// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal built-in UI, served as static strings.

use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Spellboard</title>
  <style>
    body { font-family: system-ui, sans-serif; margin: 2rem; max-width: 48rem; }
    h1 { font-size: 1.4rem; }
    button { padding: 0.4rem 0.9rem; margin: 0.2rem; cursor: pointer; }
    pre { background: #f4f4f4; padding: 0.8rem; overflow-x: auto; }
  </style>
</head>
<body>
  <h1>Spellboard</h1>
  <p>Registered buttons:</p>
  <div id="buttons">loading…</div>
  <pre id="log"></pre>
  <script src="/ui/app.js"></script>
</body>
</html>
"#;

const APP_JS: &str = r#"const log = (line) => {
  document.getElementById('log').textContent += line + '\n';
};

async function press(buttonId) {
  const res = await fetch('/spell-executions', {
    method: 'POST',
    headers: { 'content-type': 'application/json' },
    body: JSON.stringify({ button_id: buttonId }),
  });
  const body = await res.json();
  log(`${buttonId}: ${res.status} ${JSON.stringify(body)}`);
  if (body.execution_id) {
    const events = new EventSource(`/spell-executions/${body.execution_id}/events`);
    events.addEventListener('execution', (e) => log(`update: ${e.data}`));
    events.addEventListener('terminal', (e) => { log(`terminal: ${e.data}`); events.close(); });
  }
}

fetch('/buttons')
  .then((res) => res.json())
  .then((body) => {
    const root = document.getElementById('buttons');
    root.textContent = '';
    (body.buttons || []).forEach((b) => {
      const el = document.createElement('button');
      el.textContent = b.button_id;
      el.onclick = () => press(b.button_id);
      root.appendChild(el);
    });
  })
  .catch((err) => log(`buttons failed: ${err}`));
"#;

pub(crate) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub(crate) async fn app_js() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        APP_JS,
    )
        .into_response()
}
