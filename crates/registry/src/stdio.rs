//! Subprocess tool sessions over line-delimited JSON-RPC on stdio.
//!
//! The child process reads one request per line on stdin and writes one
//! response per line on stdout. Requests carry a numeric id; a pending-reply
//! map correlates responses, so concurrent `call_tool` invocations from
//! different in-flight requests are safe — there is no shared cursor.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use toolflow_core::error::ToolError;
use toolflow_core::{ToolDescriptor, ToolOutput, ToolSession};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

pub struct StdioSession {
    name: String,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicU64,
    _child: Child,
}

#[derive(Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    message: String,
}

impl StdioSession {
    /// Spawn the child and start the response reader task.
    pub fn spawn(
        name: impl Into<String>,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, ToolError> {
        let name = name.into();
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::SessionClosed(format!("{name}: spawn failed: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolError::SessionClosed(format!("{name}: no stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::SessionClosed(format!("{name}: no stdout")))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        let reader_name = name.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let response: RpcResponse = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(session = %reader_name, error = %e, "unparseable rpc line");
                        continue;
                    }
                };
                let sender = reader_pending.lock().await.remove(&response.id);
                let Some(sender) = sender else {
                    debug!(session = %reader_name, id = response.id, "orphan rpc response");
                    continue;
                };
                let outcome = match (response.result, response.error) {
                    (_, Some(err)) => Err(err.message),
                    (Some(result), None) => Ok(result),
                    (None, None) => Ok(Value::Null),
                };
                let _ = sender.send(outcome);
            }
            // Child closed stdout; fail everything still in flight.
            let mut stale = reader_pending.lock().await;
            for (_, sender) in stale.drain() {
                let _ = sender.send(Err("session closed".into()));
            }
        });

        Ok(Self {
            name,
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            _child: child,
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = frame.to_string();
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.lock().await.remove(&id);
                return Err(ToolError::SessionClosed(format!(
                    "{}: write failed: {e}",
                    self.name
                )));
            }
            if let Err(e) = stdin.flush().await {
                self.pending.lock().await.remove(&id);
                return Err(ToolError::SessionClosed(format!(
                    "{}: flush failed: {e}",
                    self.name
                )));
            }
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(ToolError::ExecutionFailed {
                tool_name: method.to_string(),
                reason: message,
            }),
            Err(_) => Err(ToolError::SessionClosed(format!(
                "{}: reply channel dropped",
                self.name
            ))),
        }
    }
}

#[async_trait]
impl ToolSession for StdioSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .cloned()
            .unwrap_or(Value::Array(vec![]));
        serde_json::from_value(tools)
            .map_err(|e| ToolError::InvalidArguments(format!("bad tools/list payload: {e}")))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolOutput, ToolError> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| ToolError::InvalidArguments(format!("bad tools/call payload: {e}")))
    }
}
