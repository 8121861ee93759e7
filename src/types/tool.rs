use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id, unique within one response.
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: ToolCallType,
    pub name: String,
    /// Decoded arguments object.
    pub arguments: Value,
    /// Position in the provider's parallel-call array.
    pub index: u32,
}

/// Type of tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallType {
    Function,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
        index: u32,
    ) -> Self {
        ToolCall {
            id: id.into(),
            call_type: ToolCallType::Function,
            name: name.into(),
            arguments,
            index,
        }
    }
}

/// One partial tool-call fragment from a streaming delta.
///
/// `name` and `arguments` are concatenated across fragments with the
/// same index by the accumulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Outcome of executing one tool call. Produced 1:1 per executed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result: Value,
    ) -> Self {
        ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            result,
            success: true,
            error: None,
        }
    }

    /// A failed result carrying an explanation instead of a value.
    pub fn failed(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            result: Value::Null,
            success: false,
            error: Some(error.into()),
        }
    }

    /// Text form used as the content of the tool-role follow-up message.
    pub fn content(&self) -> String {
        if self.success {
            self.result.to_string()
        } else {
            self.error
                .clone()
                .unwrap_or_else(|| "Tool execution failed".to_string())
        }
    }
}

/// Declaration of a callable tool, offered to models that support
/// function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Globally unique name within the registry.
    pub name: String,
    pub description: String,
    /// JSON-schema-shaped parameter description.
    pub parameters: Value,
    #[serde(default)]
    pub strict: bool,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            parameters,
            strict: false,
        }
    }
}
