//! MCP client over stdio or streamable HTTP.
//!
//! The dispatch loop issues one tool call at a time, so the stdio transport
//! writes a request and reads stdout lines until the matching response
//! arrives, all under a single lock.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{McpServerConfig, McpTransport};
use crate::error::{RelayError, Result};

use super::types::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpToolDef, ToolsCallResult,
    ToolsListResult, PROTOCOL_VERSION,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const SESSION_HEADER: &str = "Mcp-Session-Id";
const ACCEPT_HEADER: &str = "application/json, text/event-stream";

fn mcp_err(msg: impl Into<String>) -> RelayError {
    RelayError::Mcp(msg.into())
}

/// Turn a JSON-RPC response into its `result`, or its error.
fn into_result(resp: JsonRpcResponse, method: &str) -> Result<Value> {
    if let Some(err) = resp.error {
        return Err(mcp_err(format!(
            "'{}' failed: code={} message={}",
            method, err.code, err.message
        )));
    }
    Ok(resp.result.unwrap_or(Value::Null))
}

/// A way to exchange JSON-RPC messages with one server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;
}

// ============================================================================
// stdio
// ============================================================================

struct StdioPipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A spawned server speaking newline-delimited JSON-RPC.
pub struct StdioTransport {
    _child: Child,
    pipes: Mutex<StdioPipes>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl StdioTransport {
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        info!(command, ?args, "Spawning MCP server process");

        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| mcp_err(format!("failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| mcp_err("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| mcp_err("failed to capture stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim();
                    if !line.is_empty() {
                        warn!(stderr = %line, "MCP server stderr");
                    }
                }
            });
        }

        Ok(Self {
            _child: child,
            pipes: Mutex::new(StdioPipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            next_id: AtomicU64::new(1),
            timeout,
        })
    }

    async fn write_line(pipes: &mut StdioPipes, payload: &impl serde::Serialize) -> Result<()> {
        let mut line = serde_json::to_string(payload)?;
        line.push('\n');
        pipes.stdin.write_all(line.as_bytes()).await?;
        pipes.stdin.flush().await?;
        Ok(())
    }

    async fn read_response(pipes: &mut StdioPipes, id: u64) -> Result<JsonRpcResponse> {
        let mut line = String::new();
        loop {
            line.clear();
            if pipes.stdout.read_line(&mut line).await? == 0 {
                return Err(mcp_err("server closed stdout"));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.is_reply_to(id) => return Ok(resp),
                Ok(_) => debug!(raw = %trimmed, "Skipping unrelated MCP message"),
                Err(e) => debug!(error = %e, raw = %trimmed, "Non JSON-RPC line from MCP server"),
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut pipes = self.pipes.lock().await;
        debug!(method, id, "client -> MCP server");

        Self::write_line(&mut pipes, &JsonRpcRequest::new(id, method, params)).await?;
        let resp = tokio::time::timeout(self.timeout, Self::read_response(&mut pipes, id))
            .await
            .map_err(|_| {
                mcp_err(format!(
                    "'{}' timed out after {}s",
                    method,
                    self.timeout.as_secs()
                ))
            })??;
        into_result(resp, method)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let mut pipes = self.pipes.lock().await;
        Self::write_line(&mut pipes, &JsonRpcNotification::new(method, params)).await
    }
}

// ============================================================================
// streamable HTTP
// ============================================================================

/// JSON-RPC over HTTP POST; responses are JSON or a short event stream.
pub struct HttpTransport {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: &str, headers: HashMap<String, String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            url: url.to_string(),
            headers,
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    async fn post(&self, body: &impl serde::Serialize) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(&self.url)
            .header("Accept", ACCEPT_HEADER)
            .header("MCP-Protocol-Version", PROTOCOL_VERSION)
            .json(body);
        for (name, value) in &self.headers {
            req = req.header(name, value);
        }
        if let Some(session) = self.session_id.read().await.clone() {
            req = req.header(SESSION_HEADER, session);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| mcp_err(format!("POST {} failed: {}", self.url, e)))?;

        if let Some(session) = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.trim().is_empty())
        {
            *self.session_id.write().await = Some(session.to_string());
        }
        Ok(resp)
    }
}

/// Find the response to `id` among the `data:` events of an event stream.
pub fn parse_event_stream(body: &str, id: u64) -> Option<JsonRpcResponse> {
    let mut data = String::new();
    let mut events = Vec::new();
    for line in body.lines().map(str::trim_end) {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        } else if line.is_empty() && !data.is_empty() {
            events.push(std::mem::take(&mut data));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    events
        .iter()
        .filter_map(|e| serde_json::from_str::<JsonRpcResponse>(e).ok())
        .find(|resp| resp.is_reply_to(id))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(method, id, url = %self.url, "client -> MCP server");

        let resp = self.post(&JsonRpcRequest::new(id, method, params)).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(mcp_err(format!(
                "server returned HTTP {} for '{}': {}",
                status, method, body
            )));
        }

        let is_stream = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = resp.text().await?;

        let parsed = if is_stream {
            parse_event_stream(&body, id)
                .ok_or_else(|| mcp_err(format!("no response to '{}' in event stream", method)))?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body)?
        };
        into_result(parsed, method)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let resp = self.post(&JsonRpcNotification::new(method, params)).await?;
        if !resp.status().is_success() {
            warn!(method, status = %resp.status(), "MCP notification rejected");
        }
        Ok(())
    }
}

// ============================================================================
// Client
// ============================================================================

/// An initialized connection to one MCP server.
pub struct McpClient {
    server_name: String,
    transport: Box<dyn Transport>,
}

impl McpClient {
    /// Connect with the configured transport and perform the handshake.
    pub async fn connect(server_name: &str, config: &McpServerConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let transport: Box<dyn Transport> = match config.transport {
            McpTransport::Stdio => {
                let command = config
                    .command
                    .as_deref()
                    .ok_or_else(|| mcp_err(format!("server '{}' has no command", server_name)))?;
                Box::new(StdioTransport::spawn(
                    command,
                    &config.args,
                    &config.env,
                    timeout,
                )?)
            }
            McpTransport::StreamableHttp => {
                let url = config
                    .url
                    .as_deref()
                    .ok_or_else(|| mcp_err(format!("server '{}' has no url", server_name)))?;
                Box::new(HttpTransport::new(url, config.headers.clone(), timeout))
            }
        };

        let client = Self::with_transport(server_name, transport);
        client.initialize().await?;
        Ok(client)
    }

    pub fn with_transport(server_name: &str, transport: Box<dyn Transport>) -> Self {
        Self {
            server_name: server_name.to_string(),
            transport,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    async fn initialize(&self) -> Result<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "chatrelay", "version": env!("CARGO_PKG_VERSION")},
        });
        let result = self.transport.request("initialize", Some(params)).await?;
        info!(
            server = %self.server_name,
            protocol = result["protocolVersion"].as_str().unwrap_or("unknown"),
            remote = result["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            "MCP server initialized"
        );
        self.transport
            .notify("notifications/initialized", None)
            .await
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        let result = self.transport.request("tools/list", None).await?;
        let list: ToolsListResult = serde_json::from_value(result)?;
        debug!(server = %self.server_name, count = list.tools.len(), "Fetched MCP tools");
        Ok(list.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        let result = self
            .transport
            .request(
                "tools/call",
                Some(json!({"name": name, "arguments": arguments})),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory server answering `tools/list` and echoing `tools/call`.
    pub(crate) struct FakeTransport {
        pub tools: Value,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
            match method {
                "initialize" => Ok(json!({"protocolVersion": PROTOCOL_VERSION, "serverInfo": {"name": "fake"}})),
                "tools/list" => Ok(json!({"tools": self.tools})),
                "tools/call" => {
                    let params = params.unwrap_or_default();
                    if params["name"] == "explode" {
                        return Ok(json!({"content": [{"type": "text", "text": "kaboom"}], "isError": true}));
                    }
                    Ok(json!({
                        "content": [{"type": "text", "text": format!("called {} with {}", params["name"], params["arguments"])}]
                    }))
                }
                other => Err(mcp_err(format!("unexpected method {}", other))),
            }
        }

        async fn notify(&self, _method: &str, _params: Option<Value>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_list_and_call() {
        let client = McpClient::with_transport(
            "fake",
            Box::new(FakeTransport {
                tools: json!([{"name": "echo", "description": "Echo", "inputSchema": {"type": "object"}}]),
            }),
        );
        client.initialize().await.unwrap();

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let result = client.call_tool("echo", json!({"x": 1})).await.unwrap();
        assert!(result.text().contains("called \"echo\""));
    }

    #[test]
    fn test_into_result_error() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let err = into_result(resp, "tools/call").unwrap_err();
        assert!(err.to_string().contains("Method not found"));
    }

    #[test]
    fn test_parse_event_stream() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"ok\":true}}\n\n";
        let resp = parse_event_stream(body, 3).unwrap();
        assert_eq!(resp.result.unwrap()["ok"], true);
        assert!(parse_event_stream(body, 4).is_none());
    }

    #[tokio::test]
    async fn test_stdio_spawn_failure() {
        let err = StdioTransport::spawn(
            "/nonexistent/mcp-server-binary",
            &[],
            &HashMap::new(),
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(err, RelayError::Mcp(_)));
    }
}
