//! End-to-end tests against a mock HTTP server: real transport, real
//! chunk decoding, wire bodies shaped like the live provider APIs.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use llm_relay::{
    AnthropicProvider, CitationMode, Error, FinishReason, GoogleProvider, HttpTransport, LlmClient,
    ModelInfo, ModelRegistry, OpenAIProvider, Request, Response, ResponsesProvider, Tool,
    ToolDefinition, ToolRegistry, ToolStrategy,
};

struct RollTool;

#[async_trait::async_trait]
impl Tool for RollTool {
    fn name(&self) -> &str {
        "roll"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("roll", "Roll dice", json!({"type": "object"}))
    }

    async fn execute(&self, _arguments: &Value, _tool_call_id: &str) -> Result<Value, Error> {
        Ok(json!({"value": 4}))
    }
}

fn registry() -> Arc<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    for id in ["gpt-4o", "gpt-5", "claude-3-5-sonnet-20241022", "gemini-2.0-flash"] {
        registry.register(
            ModelInfo::new(id)
                .with_tool("stream", ToolStrategy::Native)
                .with_tool("function_calling", ToolStrategy::Native),
        );
    }
    Arc::new(registry)
}

fn client(provider: Box<dyn llm_relay::Provider>) -> LlmClient {
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(RollTool));
    LlmClient::new(
        provider,
        Arc::new(HttpTransport::new().unwrap()),
        registry(),
    )
    .with_tools(Arc::new(tools))
}

fn sse(events: &[Value]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str("data: ");
        body.push_str(&event.to_string());
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

#[tokio::test]
async fn test_openai_stream_end_to_end() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"choices": [{"index": 0, "delta": {"content": "Hel"}}]}),
        json!({"choices": [{"index": 0, "delta": {"content": "lo"}, "finish_reason": "stop"}]}),
        json!({"choices": [], "usage": {"prompt_tokens": 7, "completion_tokens": 2}}),
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "stream": true,
            "stream_options": {"include_usage": true}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = client(Box::new(OpenAIProvider::with_base_url("sk-test", server.uri())));
    let request = Request::new("gpt-4o").user("hi").streaming();
    let deltas: Vec<Response> = client.stream(&request).await.unwrap().collect().await;

    assert_eq!(deltas.len(), 3);
    assert_eq!(deltas[0].content, "Hel");
    assert_eq!(deltas[1].content, "lo");
    assert!(deltas[2].is_done);
    assert_eq!(deltas[2].finish_reason, Some(FinishReason::Stop));
    assert_eq!(deltas[2].usage.as_ref().unwrap().input_tokens, 7);
}

#[tokio::test]
async fn test_anthropic_stream_folds_into_complete_response() {
    let server = MockServer::start().await;
    let body = "\
event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":12,\"output_tokens\":0}}}\n\n\
event: content_block_start\n\
data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" there\"}}\n\n\
event: content_block_stop\n\
data: {\"type\":\"content_block_stop\",\"index\":0}\n\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":6}}\n\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = client(Box::new(AnthropicProvider::with_base_url(
        "sk-ant-test",
        server.uri(),
    )));
    let request = Request::new("claude-3-5-sonnet-20241022").user("hi").streaming();
    let response = client.complete(&request).await.unwrap();

    assert_eq!(response.content, "Hello there");
    assert!(response.is_done);
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    let usage = response.usage.unwrap();
    assert_eq!(usage.input_tokens, 12);
    assert_eq!(usage.output_tokens, 6);
}

#[tokio::test]
async fn test_google_blocking_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .and(query_param("key", "g-key"))
        .and(body_partial_json(json!({
            "generationConfig": {"maxOutputTokens": 800}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Bonjour!"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "totalTokenCount": 11}
        })))
        .mount(&server)
        .await;

    let client = client(Box::new(GoogleProvider::with_base_url("g-key", server.uri())));
    let response = client
        .execute(&Request::new("gemini-2.0-flash").user("hi"))
        .await
        .unwrap();

    assert_eq!(response.content, "Bonjour!");
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage.unwrap().output_tokens, 6);
}

#[tokio::test]
async fn test_responses_stream_citations_normalize() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"type": "response.output_text.delta", "output_index": 0, "delta": "Rust is fast. Trust me."}),
        json!({
            "type": "response.output_text.annotation.added",
            "annotation": {
                "type": "url_citation",
                "url": "https://rust-lang.org",
                "title": "Rust",
                "start_index": 0,
                "end_index": 13
            }
        }),
        json!({
            "type": "response.completed",
            "response": {
                "status": "completed",
                "output": [],
                "usage": {"input_tokens": 9, "output_tokens": 7}
            }
        }),
    ]);
    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(body_partial_json(json!({"model": "gpt-5", "store": false})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = client(Box::new(ResponsesProvider::with_base_url("sk-test", server.uri())));
    let request = Request::new("gpt-5").user("is rust fast?").streaming();
    let response = client.complete(&request).await.unwrap();

    assert_eq!(response.content, "Rust is fast. Trust me.");
    let citations = client.citations(&response).unwrap();
    assert_eq!(citations.mode, CitationMode::Segments);
    assert_eq!(citations.citations[0].url, "https://rust-lang.org");
    assert_eq!(citations.text_segments[0].text, "Rust is fast.");
    let rebuilt: String = citations.text_segments.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(rebuilt, response.content);
}

#[tokio::test]
async fn test_tool_loop_over_http() {
    let server = MockServer::start().await;
    // First round asks for a tool; the mock expires after one match so
    // the follow-up request falls through to the answer mock.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "roll", "arguments": "{\"dice\":1}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "roll a die"}]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"content": "You rolled a 4."},
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let client = client(Box::new(OpenAIProvider::with_base_url("sk-test", server.uri())));
    let response = client
        .run_tool_loop(&Request::new("gpt-4o").user("roll a die"), 3)
        .await
        .unwrap();

    assert_eq!(response.content, "You rolled a 4.");
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn test_upstream_error_surfaces_in_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let client = client(Box::new(OpenAIProvider::with_base_url("sk-bad", server.uri())));
    let response = client
        .execute(&Request::new("gpt-4o").user("hi"))
        .await
        .unwrap();

    let error = response.error.as_deref().unwrap();
    assert!(error.contains("401"));
    assert!(error.contains("invalid api key"));
    assert!(!response.is_done);
}
