use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Responses API request body.
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: ResponsesInput,
    /// Conversations are never stored server-side.
    pub store: bool,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ResponsesReasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

/// A lone user turn collapses to a bare string.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponsesInput {
    Text(String),
    Items(Vec<ResponsesInputItem>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ResponsesInputItem {
    #[serde(rename = "message")]
    Message { role: String, content: String },
    #[serde(rename = "function_call")]
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(rename = "function_call_output")]
    FunctionCallOutput { call_id: String, output: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesReasoning {
    pub effort: String,
}

/// Streamed event. The catalogue of event types keeps growing, so this
/// stays a loose bag of optional fields keyed by `type`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesStreamEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub delta: Option<String>,
    pub output_index: Option<u32>,
    pub item: Option<ResponsesOutputItem>,
    pub annotation: Option<Value>,
    pub response: Option<ResponsesResponse>,
    pub message: Option<String>,
}

/// Response object, seen complete on blocking calls and inside
/// `response.completed` / `response.failed` stream events.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesResponse {
    #[serde(default)]
    pub output: Vec<ResponsesOutputItem>,
    pub usage: Option<ResponsesUsage>,
    pub error: Option<ResponsesError>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesOutputItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: Vec<ResponsesOutputContent>,
    },
    #[serde(rename = "function_call")]
    FunctionCall {
        call_id: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesOutputContent {
    #[serde(rename = "output_text")]
    OutputText {
        #[serde(default)]
        text: String,
        #[serde(default)]
        annotations: Vec<Value>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsesUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    pub output_tokens_details: Option<ResponsesOutputTokensDetails>,
    pub input_tokens_details: Option<ResponsesInputTokensDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsesOutputTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsesInputTokensDetails {
    #[serde(default)]
    pub cached_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_user_input_serializes_as_string() {
        let request = ResponsesRequest {
            model: "gpt-5".to_string(),
            input: ResponsesInput::Text("hi".to_string()),
            store: false,
            stream: true,
            instructions: None,
            reasoning: None,
            tools: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["input"], "hi");
        assert_eq!(json["store"], false);
    }

    #[test]
    fn test_input_items_serialize_tagged() {
        let items = vec![
            ResponsesInputItem::Message {
                role: "user".to_string(),
                content: "roll".to_string(),
            },
            ResponsesInputItem::FunctionCall {
                call_id: "call_1".to_string(),
                name: "roll".to_string(),
                arguments: "{}".to_string(),
            },
            ResponsesInputItem::FunctionCallOutput {
                call_id: "call_1".to_string(),
                output: "{\"value\":3}".to_string(),
            },
        ];
        let json = serde_json::to_value(&items).unwrap();
        assert_eq!(json[0]["type"], "message");
        assert_eq!(json[1]["type"], "function_call");
        assert_eq!(json[2]["type"], "function_call_output");
    }

    #[test]
    fn test_stream_event_parses_loosely() {
        let event: ResponsesStreamEvent = serde_json::from_value(json!({
            "type": "response.output_text.delta",
            "output_index": 0,
            "delta": "Hel"
        }))
        .unwrap();
        assert_eq!(event.event_type, "response.output_text.delta");
        assert_eq!(event.delta.as_deref(), Some("Hel"));
    }

    #[test]
    fn test_unknown_output_item_is_tolerated() {
        let response: ResponsesResponse = serde_json::from_value(json!({
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [{"type": "output_text", "text": "hi"}]}
            ],
            "status": "completed"
        }))
        .unwrap();
        assert!(matches!(response.output[0], ResponsesOutputItem::Unknown));
        assert!(matches!(response.output[1], ResponsesOutputItem::Message { .. }));
    }
}
