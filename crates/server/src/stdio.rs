//! JSON-RPC 2.0 over stdio, one JSON message per line.

use crate::error::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, Result,
};
use crate::tools::ErpTools;
use rmcp::model::ListToolsResult;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};

const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub struct McpServer {
    tools: ErpTools,
}

impl McpServer {
    #[must_use]
    pub fn new(tools: ErpTools) -> Self {
        Self { tools }
    }

    /// Handle one input line. Returns the response to write, if any.
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(msg) => self.handle_message(&msg).await,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable message");
                Some(jsonrpc_err(&Value::Null, PARSE_ERROR, &format!("parse error: {e}")))
            }
        }
    }

    async fn handle_message(&self, msg: &Value) -> Option<Value> {
        let Some(obj) = msg.as_object() else {
            return Some(jsonrpc_err(
                &Value::Null,
                INVALID_REQUEST,
                "expected a JSON-RPC object",
            ));
        };

        // Notifications (no `id`) never get a response.
        let id = obj.get("id")?.clone();
        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A response to a request we never sent, or garbage.
            return obj
                .get("result")
                .or_else(|| obj.get("error"))
                .is_none()
                .then(|| jsonrpc_err(&id, INVALID_REQUEST, "missing method"));
        };
        tracing::debug!(method, "request");

        let params = obj.get("params");
        Some(match method {
            "initialize" => jsonrpc_ok(&id, &initialize_result(params)),
            "ping" => jsonrpc_ok(&id, &json!({})),
            "tools/list" => {
                let result = ListToolsResult {
                    tools: self.tools.list_tools(),
                    ..Default::default()
                };
                match serde_json::to_value(&result) {
                    Ok(value) => jsonrpc_ok(&id, &value),
                    Err(e) => jsonrpc_err(&id, INTERNAL_ERROR, &e.to_string()),
                }
            }
            "tools/call" => self.tools_call(&id, params).await,
            other => jsonrpc_err(&id, METHOD_NOT_FOUND, &format!("method not found: {other}")),
        })
    }

    async fn tools_call(&self, id: &Value, params: Option<&Value>) -> Value {
        let Some(name) = params
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
        else {
            return jsonrpc_err(id, INVALID_PARAMS, "missing tool name");
        };

        let arguments = match params.and_then(|p| p.get("arguments")) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(args)) => args.clone(),
            Some(_) => return jsonrpc_err(id, INVALID_PARAMS, "arguments must be an object"),
        };

        match self.tools.call_tool(name, &arguments).await {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => jsonrpc_ok(id, &value),
                Err(e) => jsonrpc_err(id, INTERNAL_ERROR, &e.to_string()),
            },
            Err(e) => jsonrpc_err(id, e.code(), &e.to_string()),
        }
    }
}

/// Serve requests from `reader` until EOF, writing responses to `writer`.
///
/// Requests are handled one at a time in arrival order.
///
/// # Errors
///
/// Returns an IO error if reading input or writing a response fails.
pub async fn serve<R, W>(server: &McpServer, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(response) = server.handle_line(&line).await {
            write_json_line(&mut writer, &response).await?;
        }
    }
    tracing::info!("stdin closed; shutting down");
    Ok(())
}

async fn write_json_line<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Value) -> Result<()> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

fn initialize_result(params: Option<&Value>) -> Value {
    let protocol_version = params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);

    json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn jsonrpc_ok(id: &Value, result: &Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn jsonrpc_err(id: &Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}
