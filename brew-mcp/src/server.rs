//! MCP server — JSON-RPC 2.0 over newline-delimited stdio
//!
//! Exposes the [`ToolRegistry`] to an MCP client: `initialize`, `ping`,
//! `tools/list` and `tools/call`. Each tool call runs on its own task so slow
//! brew commands never block the read loop, and all responses go through a
//! single writer task so lines never interleave. `notifications/cancelled`
//! aborts the matching in-flight call, which kills its child process.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::registry::ToolRegistry;

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub struct McpServer {
    registry: Arc<ToolRegistry>,
    name: String,
    version: String,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, name: &str) -> Self {
        Self {
            registry,
            name: name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Serve requests from `reader` until EOF, writing responses to `writer`.
    /// In-flight calls are drained before returning.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Value>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut calls: JoinSet<()> = JoinSet::new();
        let mut in_flight: HashMap<String, AbortHandle> = HashMap::new();

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .context("Failed to read request")?;
            if read == 0 {
                break;
            }

            while calls.try_join_next().is_some() {}
            in_flight.retain(|_, handle| !handle.is_finished());

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!("Request is not valid UTF-8: {e}");
                    send(&tx, error_response(Value::Null, PARSE_ERROR, &format!("Parse error: {e}")));
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            debug!("<- {line}");

            let value: Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(e) => {
                    send(&tx, error_response(Value::Null, PARSE_ERROR, &format!("Parse error: {e}")));
                    continue;
                }
            };
            let raw_id = value.get("id").cloned().unwrap_or(Value::Null);
            let request: JsonRpcRequest = match serde_json::from_value(value) {
                Ok(request) => request,
                Err(e) => {
                    send(&tx, error_response(raw_id, INVALID_REQUEST, &format!("Invalid request: {e}")));
                    continue;
                }
            };

            let Some(id) = request.id else {
                self.handle_notification(&request.method, &request.params, &mut in_flight);
                continue;
            };

            match request.method.as_str() {
                "initialize" => send(&tx, result_response(id, self.initialize_result(&request.params))),
                "ping" => send(&tx, result_response(id, json!({}))),
                "tools/list" => {
                    let tools = self.registry.list_tools();
                    send(&tx, result_response(id, json!({ "tools": tools })));
                }
                "tools/call" => {
                    let params: CallParams = match serde_json::from_value(request.params) {
                        Ok(params) => params,
                        Err(e) => {
                            send(&tx, error_response(id, INVALID_PARAMS, &format!("Invalid params: {e}")));
                            continue;
                        }
                    };
                    if self.registry.get_tool(&params.name).is_none() {
                        let message = ToolError::UnknownTool(params.name).to_string();
                        send(&tx, error_response(id, INVALID_PARAMS, &message));
                        continue;
                    }

                    let key = id.to_string();
                    if in_flight.contains_key(&key) {
                        send(
                            &tx,
                            error_response(id, INVALID_REQUEST, &format!("Request id {key} is already in flight")),
                        );
                        continue;
                    }
                    let registry = Arc::clone(&self.registry);
                    let tx = tx.clone();
                    let handle = calls.spawn(async move {
                        let result = call_result(&registry, &params.name, params.arguments).await;
                        send(&tx, result_response(id, result));
                    });
                    in_flight.insert(key, handle);
                }
                other => {
                    send(&tx, error_response(id, METHOD_NOT_FOUND, &format!("Method not found: {other}")));
                }
            }
        }

        info!("Input closed, waiting for {} in-flight calls", calls.len());
        while calls.join_next().await.is_some() {}

        drop(tx);
        writer_task
            .await
            .context("Response writer task panicked")?
            .context("Failed to write response")
    }

    fn handle_notification(
        &self,
        method: &str,
        params: &Value,
        in_flight: &mut HashMap<String, AbortHandle>,
    ) {
        match method {
            "notifications/initialized" => info!("Client initialized"),
            "notifications/cancelled" => {
                let Some(request_id) = params.get("requestId") else {
                    warn!("Cancellation without requestId");
                    return;
                };
                if let Some(handle) = in_flight.remove(&request_id.to_string()) {
                    info!("Cancelling request {request_id}");
                    handle.abort();
                }
            }
            other => debug!("Ignoring notification {other}"),
        }
    }

    fn initialize_result(&self, params: &Value) -> Value {
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);
        json!({
            "protocolVersion": protocol_version,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": self.name, "version": self.version }
        })
    }
}

/// Tool failures are reported in-band with `isError`, not as protocol errors
async fn call_result(registry: &ToolRegistry, name: &str, arguments: Value) -> Value {
    let (text, is_error) = match registry.call(name, arguments).await {
        Ok(text) => (text, false),
        Err(e) => (e.to_string(), true),
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Value>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_string(&message)?;
        debug!("-> {line}");
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

fn send(tx: &mpsc::UnboundedSender<Value>, message: Value) {
    if tx.send(message).is_err() {
        warn!("Response dropped: writer has shut down");
    }
}

fn result_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}
