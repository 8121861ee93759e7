//! Tool registration, execution, and the MCP bridge.
//!
//! Tools are advertised to models through function-calling definitions
//! and executed locally when a model requests them. Tools backed by an
//! MCP server plug in through the same [`Tool`] trait via
//! [`McpTool`]; the provider layer only ever sees definitions and
//! results.

mod executor;
mod mcp;

pub use executor::ToolExecutor;
pub use mcp::{McpClient, McpError, McpServerConfig, McpTool};

use serde_json::Value;
use std::collections::BTreeMap;

use crate::registry::{ModelInfo, ToolStrategy};
use crate::types::{ToolDefinition, ToolResult};
use crate::Error;

/// A callable tool exposed to models through function calling.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, doubling as the function-calling name.
    fn name(&self) -> &str;

    /// The definition advertised to providers.
    fn definition(&self) -> ToolDefinition;

    /// Whether the tool's backing service is configured well enough to
    /// advertise it. Checked when definitions are collected, not at
    /// registration.
    fn is_available(&self) -> bool {
        true
    }

    /// Whether this tool routes through an external MCP server.
    fn is_external(&self) -> bool {
        false
    }

    /// Run the tool with decoded arguments.
    async fn execute(&self, arguments: &Value, tool_call_id: &str) -> Result<Value, Error>;
}

/// Name-keyed collection of every registered tool.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if tool.is_external() {
            tracing::info!(tool = %name, "registered MCP tool");
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn unregister(&mut self, name: &str) {
        self.tools.remove(name);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Definitions of every tool this model may use.
    ///
    /// A tool qualifies when the model supports function calling, the
    /// model additionally supports MCP for external tools, and the
    /// model's capability record does not mark the tool unsupported.
    /// Unavailable tools are skipped with a warning.
    pub fn eligible_definitions(&self, model: &ModelInfo) -> Vec<ToolDefinition> {
        if !model.supports_function_calling() {
            return Vec::new();
        }

        self.tools
            .values()
            .filter(|tool| {
                if tool.is_external() && !model.supports_mcp_tools() {
                    return false;
                }
                if matches!(
                    model.tool_strategy(tool.name()),
                    Some(ToolStrategy::Unsupported)
                ) {
                    return false;
                }
                if !tool.is_available() {
                    tracing::warn!(tool = %tool.name(), "tool backend unavailable, skipping");
                    return false;
                }
                true
            })
            .map(|tool| tool.definition())
            .collect()
    }

    /// Execute one call by tool name.
    ///
    /// Never fails outward: an unknown tool or a failing execution
    /// produces a failed [`ToolResult`] that flows back to the model.
    pub async fn execute(&self, name: &str, arguments: &Value, tool_call_id: &str) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            tracing::error!(tool = %name, "tool not found");
            return ToolResult::failed(
                tool_call_id,
                name,
                format!("Tool '{name}' is not registered"),
            );
        };

        match tool.execute(arguments, tool_call_id).await {
            Ok(result) => ToolResult::ok(tool_call_id, name, result),
            Err(err) => {
                tracing::error!(tool = %name, error = %err, "tool execution failed");
                ToolResult::failed(tool_call_id, name, err.to_string())
            }
        }
    }
}
