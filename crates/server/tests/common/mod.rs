use anyhow::Context as _;
use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use erp_mcp_test_support::{KillOnDrop, TEST_RSA_PRIVATE_KEY};
use serde_json::{Value, json};
use std::io::{BufRead as _, BufReader, Write as _};
use std::process::{ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Request counters of the mock NetSuite account.
#[derive(Default)]
pub struct MockErp {
    pub token_calls: AtomicUsize,
    pub catalog_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

pub fn mock_erp_router(state: Arc<MockErp>) -> Router {
    Router::new()
        .route("/services/rest/auth/oauth2/v1/token", post(token))
        .route(
            "/services/rest/record/v1/metadata-catalog/{record_type}",
            get(catalog),
        )
        .route("/services/rest/query/v1/suiteql", post(suiteql))
        .with_state(state)
}

async fn token(State(state): State<Arc<MockErp>>) -> Json<Value> {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({"access_token": "mock-token", "token_type": "bearer", "expires_in": 3600}))
}

async fn catalog(
    State(state): State<Arc<MockErp>>,
    Path(record_type): Path<String>,
) -> (StatusCode, Json<Value>) {
    state.catalog_calls.fetch_add(1, Ordering::SeqCst);
    if record_type != "customer" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"title": "Record type not found"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"components": {"schemas": {
            "customer": {
                "type": "object",
                "properties": {
                    "companyName": {"type": "string", "nullable": true},
                    "entity": {"$ref": "#/components/schemas/nsResource"},
                    "addressbook": {
                        "type": "array",
                        "items": {"$ref": "#/components/schemas/nsResource"}
                    }
                }
            },
            "nsResource": {
                "type": "object",
                "properties": {"id": {"type": "string"}, "refName": {"type": "string"}}
            }
        }}})),
    )
}

async fn suiteql(
    State(state): State<Arc<MockErp>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.query_calls.fetch_add(1, Ordering::SeqCst);
    let q = body["q"].as_str().unwrap_or_default();
    if q.contains("nosuchtable") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"title": "Invalid search query"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "count": 2,
            "offset": 0,
            "totalResults": 2,
            "hasMore": false,
            "items": [
                {"links": [], "id": "1", "name": "Widget"},
                {"links": [], "id": "2", "name": "Gadget"}
            ]
        })),
    )
}

/// A running server process with line-oriented access to its stdio.
pub struct ServerProcess {
    _child: KillOnDrop,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    _key: tempfile::NamedTempFile,
}

impl ServerProcess {
    pub fn spawn(base_url: &str, record_types: &str) -> anyhow::Result<Self> {
        let mut key = tempfile::NamedTempFile::new().context("create key file")?;
        key.write_all(TEST_RSA_PRIVATE_KEY.as_bytes())
            .context("write key file")?;

        let bin = env!("CARGO_BIN_EXE_erp-mcp-server");
        let mut child = Command::new(bin)
            .env_clear()
            .env("NETSUITE_ACCOUNT_ID", "1234567_SB1")
            .env("NETSUITE_CLIENT_ID", "integration-client")
            .env("NETSUITE_CERTIFICATE_ID", "cert-kid")
            .env("NETSUITE_PRIVATE_KEY_PATH", key.path())
            .env("NETSUITE_BASE_URL", format!("{base_url}/services/rest"))
            .env("NETSUITE_RECORD_TYPES", record_types)
            .arg("--log-level")
            .arg("debug")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context("spawn erp-mcp-server")?;

        let stdin = child.stdin.take().context("child stdin")?;
        let stdout = BufReader::new(child.stdout.take().context("child stdout")?);
        Ok(Self {
            _child: KillOnDrop(child),
            stdin,
            stdout,
            _key: key,
        })
    }

    pub fn send(&mut self, msg: &Value) -> anyhow::Result<()> {
        writeln!(self.stdin, "{msg}").context("write request")?;
        self.stdin.flush().context("flush request")
    }

    pub fn recv(&mut self) -> anyhow::Result<Value> {
        let mut line = String::new();
        let n = self.stdout.read_line(&mut line).context("read response")?;
        anyhow::ensure!(n > 0, "server closed stdout");
        serde_json::from_str(&line).with_context(|| format!("parse response: {line}"))
    }

    pub fn request(&mut self, id: u64, method: &str, params: Value) -> anyhow::Result<Value> {
        self.send(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))?;
        let resp = self.recv()?;
        anyhow::ensure!(resp["id"] == id, "response id mismatch: {resp}");
        Ok(resp)
    }

    /// Text content of a successful `tools/call`, parsed as JSON.
    pub fn call_tool(&mut self, id: u64, name: &str, arguments: Value) -> anyhow::Result<Value> {
        let resp = self.request(id, "tools/call", json!({"name": name, "arguments": arguments}))?;
        anyhow::ensure!(
            resp["result"]["isError"] != json!(true),
            "tool reported an error: {resp}"
        );
        let text = resp["result"]["content"][0]["text"]
            .as_str()
            .context("text content")?;
        serde_json::from_str(text).context("parse tool output")
    }
}
