//! rmcp-backed MCP sessions.
//!
//! All configured servers connect concurrently at startup with a bounded
//! per-server timeout; failures are warnings, never fatal. A transport error
//! mid-session marks the server degraded for the rest of the run: calls to
//! its tools short-circuit with `McpDegraded` and no reconnection is
//! attempted.

use anyhow::{Context, Result, anyhow};
use futures::future::join_all;
use rmcp::model::CallToolRequestParams;
use rmcp::service::{RoleClient, RunningService, serve_client};
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::transport::streamable_http_client::{
    StreamableHttpClientTransport, StreamableHttpClientTransportConfig,
};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::mcp::{McpServerConfig, McpTransportConfig};
use crate::error::{ToolError, ToolErrorKind};

/// A tool advertised by a connected server, pre-namespacing.
#[derive(Debug, Clone)]
pub struct McpToolSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

type ClientService = RunningService<RoleClient, ()>;

pub struct McpServerHandle {
    pub name: String,
    service: ClientService,
    degraded: AtomicBool,
    tools: Vec<McpToolSpec>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
}

impl McpServerHandle {
    pub fn tools(&self) -> &[McpToolSpec] {
        &self.tools
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn mark_degraded(&self) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(server = self.name.as_str(), "MCP server marked degraded");
        }
    }
}

pub struct McpClientPool {
    servers: HashMap<String, Arc<McpServerHandle>>,
    call_timeout: Duration,
}

impl McpClientPool {
    /// Connect every configured server concurrently. Each connect (handshake
    /// plus tool listing) is bounded by `startup_timeout`; a server that
    /// fails is logged and omitted.
    pub async fn connect_all(
        configs: &[McpServerConfig],
        startup_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        let connects = configs.iter().map(|config| async move {
            match time::timeout(startup_timeout, connect_server(config)).await {
                Ok(Ok(handle)) => Some(handle),
                Ok(Err(err)) => {
                    warn!(
                        server = config.name.as_str(),
                        error = %err,
                        "failed to connect MCP server; omitting"
                    );
                    None
                }
                Err(_) => {
                    warn!(
                        server = config.name.as_str(),
                        "MCP server connect timed out; omitting"
                    );
                    None
                }
            }
        });

        let mut servers = HashMap::new();
        for handle in join_all(connects).await.into_iter().flatten() {
            info!(
                server = handle.name.as_str(),
                tools = handle.tools.len(),
                "MCP server connected"
            );
            servers.insert(handle.name.clone(), Arc::new(handle));
        }

        Self {
            servers,
            call_timeout,
        }
    }

    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn server(&self, name: &str) -> Option<&Arc<McpServerHandle>> {
        self.servers.get(name)
    }

    /// Drop a server entirely (schema budgeting trims this way).
    pub fn remove_server(&mut self, name: &str) -> Option<Arc<McpServerHandle>> {
        self.servers.remove(name)
    }

    /// Invoke a tool on a connected server. Degraded servers short-circuit;
    /// a call timeout fails the call without degrading the server.
    pub async fn call(&self, server: &str, tool: &str, args: Value) -> Result<String, ToolError> {
        let handle = self
            .servers
            .get(server)
            .ok_or_else(|| ToolError::other(format!("unknown MCP server '{server}'")))?;

        if handle.is_degraded() {
            return Err(ToolError::new(
                ToolErrorKind::McpDegraded,
                format!("MCP server '{server}' is degraded for the rest of this session"),
            ));
        }

        if handle.service.is_closed() {
            handle.mark_degraded();
            return Err(ToolError::new(
                ToolErrorKind::McpDegraded,
                format!("MCP server '{server}' transport has closed"),
            ));
        }

        let params = CallToolRequestParams::new(tool.to_string())
            .with_arguments(normalize_arguments(&args));

        let outcome = time::timeout(self.call_timeout, handle.service.call_tool(params)).await;
        match outcome {
            Err(_) => Err(ToolError::new(
                ToolErrorKind::McpTimeout,
                format!(
                    "MCP tool '{tool}' on '{server}' timed out after {:?}",
                    self.call_timeout
                ),
            )),
            Ok(Err(err)) => {
                handle.mark_degraded();
                Err(ToolError::new(
                    ToolErrorKind::McpDegraded,
                    format!("MCP server '{server}' transport error: {err}"),
                ))
            }
            Ok(Ok(result)) => extract_tool_result(server, tool, &result),
        }
    }

    /// Cancel every session. Called on shutdown and on user interrupt.
    pub fn shutdown_all(&self) {
        for handle in self.servers.values() {
            debug!(server = handle.name.as_str(), "closing MCP session");
            handle.service.cancellation_token().cancel();
            if let Some(task) = &handle.stderr_task {
                task.abort();
            }
        }
    }
}

async fn connect_server(config: &McpServerConfig) -> Result<McpServerHandle> {
    let (service, stderr_task) = match &config.transport {
        McpTransportConfig::Stdio { command, args, env } => {
            let mut cmd = Command::new(command);
            cmd.args(args)
                .kill_on_drop(true)
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped());
            for (key, value) in env {
                cmd.env(key, value);
            }

            let (transport, stderr) = TokioChildProcess::builder(cmd)
                .stderr(std::process::Stdio::piped())
                .spawn()
                .with_context(|| format!("failed to spawn MCP server '{}'", config.name))?;

            let stderr_task = stderr.map(|stderr| {
                let server = config.name.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        info!(server = server.as_str(), message = line.as_str(), "MCP server stderr");
                    }
                })
            });

            let service = serve_client((), transport)
                .await
                .with_context(|| format!("handshake with MCP server '{}' failed", config.name))?;
            (service, stderr_task)
        }
        McpTransportConfig::Http { url, headers } => {
            let mut header_map = reqwest::header::HeaderMap::new();
            for (key, value) in headers {
                let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                    .with_context(|| format!("invalid header name '{key}'"))?;
                let value = reqwest::header::HeaderValue::from_str(value)
                    .with_context(|| format!("invalid header value for '{key}'"))?;
                header_map.insert(name, value);
            }
            let client = reqwest::Client::builder()
                .default_headers(header_map)
                .build()
                .context("failed to build HTTP client for MCP transport")?;
            let transport = StreamableHttpClientTransport::with_client(
                client,
                StreamableHttpClientTransportConfig::with_uri(url.clone()),
            );
            let service = serve_client((), transport)
                .await
                .with_context(|| format!("handshake with MCP server '{}' failed", config.name))?;
            (service, None)
        }
    };

    let tools = service
        .peer()
        .list_all_tools()
        .await
        .with_context(|| format!("tools/list on MCP server '{}' failed", config.name))?;

    let mut specs = Vec::new();
    let mut seen = HashSet::new();
    for tool in tools {
        let value = serde_json::to_value(&tool)
            .with_context(|| format!("unserialisable tool from '{}'", config.name))?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("tool without a name from '{}'", config.name))?
            .to_string();
        if !seen.insert(name.clone()) {
            // An internal collision poisons the whole server: its tool names
            // are no longer unambiguous.
            service.cancellation_token().cancel();
            return Err(anyhow!(
                "MCP server '{}' advertises duplicate tool '{}'",
                config.name,
                name
            ));
        }
        let description = value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let schema = value
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"type": "object"}));
        specs.push(McpToolSpec {
            name,
            description,
            schema,
        });
    }

    Ok(McpServerHandle {
        name: config.name.clone(),
        service,
        degraded: AtomicBool::new(false),
        tools: specs,
        stderr_task,
    })
}

fn normalize_arguments(args: &Value) -> Map<String, Value> {
    match args {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_owned(), other.clone());
            map
        }
    }
}

/// Pull the text blocks out of a `CallToolResult` without depending on the
/// exact shape of rmcp's content model: round-trip through JSON and read
/// the fields flexibly.
fn extract_tool_result<T: serde::Serialize>(
    server: &str,
    tool: &str,
    result: &T,
) -> Result<String, ToolError> {
    let value = serde_json::to_value(result)
        .map_err(|err| ToolError::other(format!("unserialisable MCP result: {err}")))?;
    let obj = value.as_object();

    let is_error = obj
        .and_then(|o| o.get("isError").or_else(|| o.get("is_error")))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let text: String = obj
        .and_then(|o| o.get("content"))
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if is_error {
        let message = if text.is_empty() {
            format!("MCP tool '{tool}' on '{server}' reported an error")
        } else {
            text
        };
        return Err(ToolError::other(message));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_normalise_to_an_object() {
        assert!(normalize_arguments(&Value::Null).is_empty());
        let obj = normalize_arguments(&json!({"q": "hi"}));
        assert_eq!(obj.get("q").unwrap(), "hi");
        let wrapped = normalize_arguments(&json!(42));
        assert_eq!(wrapped.get("value").unwrap(), 42);
    }

    #[test]
    fn result_extraction_joins_text_blocks() {
        let result = json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "text", "text": "second"}
            ],
            "isError": false
        });
        let text = extract_tool_result("srv", "tool", &result).unwrap();
        assert_eq!(text, "first\nsecond");
    }

    #[test]
    fn error_results_become_tool_errors() {
        let result = json!({
            "content": [{"type": "text", "text": "boom"}],
            "isError": true
        });
        let err = extract_tool_result("srv", "tool", &result).unwrap_err();
        assert_eq!(err.message(), "boom");
    }
}
