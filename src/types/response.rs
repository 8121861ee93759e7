use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tool::ToolCall;

/// Reason why generation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// Token accounting for one turn.
///
/// Providers report wildly different detail; everything beyond the two
/// base counts is optional so no legitimate response is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_use_prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding_queries: Option<u32>,
}

/// One normalized response, used both as a streaming delta and as the
/// final answer.
///
/// A non-terminal delta has `is_done == false`; exactly one delta per
/// stream carries `is_done == true`. A transport or provider failure is
/// reported as a delta with `error` set and `is_done` left false.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub is_done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Provider-raw grounding/citation metadata, consumed by the
    /// citation normalizer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding: Option<Value>,
}

impl Response {
    /// An empty, non-terminal delta. Emitted for events this layer
    /// recognizes but has nothing to say about.
    pub fn empty() -> Self {
        Response::default()
    }

    /// A content-only delta.
    pub fn content_delta(text: impl Into<String>) -> Self {
        Response {
            content: text.into(),
            ..Response::default()
        }
    }

    /// The terminal delta of a stream.
    pub fn done(finish_reason: Option<FinishReason>, usage: Option<Usage>) -> Self {
        Response {
            finish_reason,
            usage,
            is_done: true,
            ..Response::default()
        }
    }

    /// An error delta. Terminates the turn but keeps `is_done` false.
    pub fn from_error(message: impl Into<String>) -> Self {
        Response {
            error: Some(message.into()),
            ..Response::default()
        }
    }

    /// Attach tool calls to this delta.
    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        if !calls.is_empty() {
            self.tool_calls = Some(calls);
        }
        self
    }

    /// Attach grounding metadata to this delta.
    pub fn with_grounding(mut self, grounding: Value) -> Self {
        self.grounding = Some(grounding);
        self
    }

    /// Whether this delta carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.tool_calls.is_none()
            && self.finish_reason.is_none()
            && self.usage.is_none()
            && !self.is_done
            && self.error.is_none()
            && self.grounding.is_none()
    }

    /// Whether the model requested tool use.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}

impl FinishReason {
    /// Parse an OpenAI-style finish reason string.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "stop" => Some(FinishReason::Stop),
            "length" => Some(FinishReason::Length),
            "tool_calls" => Some(FinishReason::ToolCalls),
            "content_filter" => Some(FinishReason::ContentFilter),
            _ => None,
        }
    }
}
