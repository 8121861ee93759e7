//! JSON-RPC client for MCP (Model Context Protocol) servers.
//!
//! MCP servers answer HTTP POSTed JSON-RPC 2.0 requests with an SSE
//! body; the matching response is the `data:` line whose `id` echoes
//! the locally generated request id.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error as ThisError;
use uuid::Uuid;

use super::Tool;
use crate::types::ToolDefinition;
use crate::Error;

/// Connection details for one MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Human-readable server label, forwarded to providers with native
    /// MCP support.
    pub label: String,
    pub url: String,
    #[serde(default = "default_approval")]
    pub require_approval: String,
}

fn default_approval() -> String {
    "never".to_string()
}

impl McpServerConfig {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            require_approval: default_approval(),
        }
    }
}

/// Failures talking to an MCP server.
#[derive(Debug, ThisError)]
pub enum McpError {
    #[error("MCP server URL is not configured")]
    MissingServerUrl,

    #[error("MCP request failed: {0}")]
    Transport(String),

    #[error("MCP request failed with HTTP {0}")]
    Status(u16),

    #[error("No valid JSON-RPC response found in SSE stream")]
    NoResponse,

    #[error("MCP Error ({code}): {message}")]
    Rpc { code: i64, message: String },
}

impl From<McpError> for Error {
    fn from(err: McpError) -> Self {
        Error::Tool(err.to_string())
    }
}

/// One-shot JSON-RPC client for a single MCP server.
pub struct McpClient {
    http: Client,
    server_url: String,
}

impl McpClient {
    pub fn new(server_url: impl Into<String>) -> Result<Self, McpError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            server_url: server_url.into(),
        })
    }

    /// Build a client from a server config, failing when no URL is set.
    pub fn from_config(config: &McpServerConfig) -> Result<Self, McpError> {
        if config.url.is_empty() {
            return Err(McpError::MissingServerUrl);
        }
        Self::new(config.url.clone())
    }

    /// Send one JSON-RPC request and return its `result` member.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let request_id = format!("mcp-{}", Uuid::new_v4());
        let request = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": method,
            "params": params,
        });

        tracing::debug!(url = %self.server_url, method = %method, "MCP request");

        let response = self
            .http
            .post(&self.server_url)
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Self::parse_sse_response(&body, &request_id)
    }

    /// List the tools the server offers. Failures log and return empty
    /// so a dead server never breaks registration.
    pub async fn list_tools(&self) -> Vec<Value> {
        match self.request("tools/list", json!({})).await {
            Ok(result) => result
                .get("tools")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            Err(err) => {
                tracing::error!(url = %self.server_url, error = %err, "failed to list MCP tools");
                Vec::new()
            }
        }
    }

    /// Invoke a named tool on the server.
    pub async fn call_tool(&self, name: &str, arguments: &Value) -> Result<Value, McpError> {
        self.request(
            "tools/call",
            json!({"name": name, "arguments": arguments}),
        )
        .await
    }

    /// Health check via `tools/list`.
    pub async fn is_available(&self) -> bool {
        self.request("tools/list", json!({})).await.is_ok()
    }

    /// Find the `data:` line answering `request_id` and unwrap it.
    fn parse_sse_response(body: &str, request_id: &str) -> Result<Value, McpError> {
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };

            let parsed: Value = match serde_json::from_str(data.trim_start()) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unparseable SSE data line");
                    continue;
                }
            };

            if parsed.get("id").and_then(Value::as_str) != Some(request_id) {
                continue;
            }

            if let Some(error) = parsed.get("error") {
                let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown MCP error")
                    .to_string();
                return Err(McpError::Rpc { code, message });
            }

            return Ok(parsed.get("result").cloned().unwrap_or_else(|| json!({})));
        }

        Err(McpError::NoResponse)
    }
}

/// A remote MCP tool exposed through the local [`Tool`] trait.
///
/// The advertised name may differ from the remote one, so the same
/// remote tool can be registered under a model-facing alias.
pub struct McpTool {
    definition: ToolDefinition,
    remote_name: String,
    config: McpServerConfig,
}

impl McpTool {
    pub fn new(
        definition: ToolDefinition,
        remote_name: impl Into<String>,
        config: McpServerConfig,
    ) -> Self {
        Self {
            definition,
            remote_name: remote_name.into(),
            config,
        }
    }
}

#[async_trait::async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn is_available(&self) -> bool {
        !self.config.url.is_empty()
    }

    fn is_external(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: &Value, _tool_call_id: &str) -> Result<Value, Error> {
        let client = McpClient::from_config(&self.config)?;
        let result = client.call_tool(&self.remote_name, arguments).await?;
        Ok(result)
    }
}
