//! High-level execution loop tying providers, transport, and tools
//! together.
//!
//! [`LlmClient`] owns one provider adapter and drives the full turn:
//! convert the request, send it, translate what comes back, and, when
//! the model asks for tools, run them and feed the results into a
//! follow-up request.

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::sync::Arc;

use crate::accumulator::ResponseAccumulator;
use crate::citations::{self, CitationData};
use crate::decoder::{JsonObjectStream, JsonObjectStreamExt};
use crate::provider::{ChunkTranslator, ConvertContext, Provider};
use crate::registry::ModelRegistry;
use crate::tools::{McpServerConfig, ToolExecutor, ToolRegistry};
use crate::transport::{collect_body, AttachmentStore, ByteStream, InMemoryAttachmentStore, Transport};
use crate::types::{Request, Response};
use crate::Error;

/// A stream of normalized response deltas.
pub type ResponseStream = BoxStream<'static, Response>;

pub struct LlmClient {
    provider: Box<dyn Provider>,
    transport: Arc<dyn Transport>,
    registry: Arc<ModelRegistry>,
    attachments: Arc<dyn AttachmentStore>,
    tools: Arc<ToolRegistry>,
    mcp_servers: Vec<McpServerConfig>,
}

impl LlmClient {
    pub fn new(
        provider: Box<dyn Provider>,
        transport: Arc<dyn Transport>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            provider,
            transport,
            registry,
            attachments: Arc::new(InMemoryAttachmentStore::new()),
            tools: Arc::new(ToolRegistry::new()),
            mcp_servers: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Arc<dyn AttachmentStore>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_mcp_servers(mut self, servers: Vec<McpServerConfig>) -> Self {
        self.mcp_servers = servers;
        self
    }

    /// Convert the request and resolve everything the provider needs.
    async fn prepare(
        &self,
        request: &Request,
    ) -> Result<(String, Vec<(String, String)>, serde_json::Value), Error> {
        let model = self.registry.find(&request.model)?;
        let tools = if request.disable_tools {
            Vec::new()
        } else {
            self.tools.eligible_definitions(model)
        };
        let context = ConvertContext {
            model,
            attachments: self.attachments.as_ref(),
            tools: &tools,
            mcp_servers: &self.mcp_servers,
        };

        let payload = self.provider.convert_request(request, &context).await?;
        let endpoint = self.provider.endpoint(&request.model, request.stream);
        Ok((endpoint, self.provider.headers(), payload))
    }

    /// One blocking round trip. Upstream failures come back as a
    /// response with `error` set rather than an `Err`, so callers treat
    /// network trouble and model output uniformly.
    pub async fn execute(&self, request: &Request) -> Result<Response, Error> {
        let (endpoint, headers, payload) = self.prepare(request).await?;

        tracing::debug!(provider = %self.provider.kind(), model = %request.model, "sending request");
        let (status, body) = self
            .transport
            .send_blocking(&endpoint, &headers, &payload)
            .await?;

        if !(200..300).contains(&status) {
            tracing::error!(provider = %self.provider.kind(), status, "upstream request failed");
            return Ok(Response::from_error(format!("HTTP {status}: {body}")));
        }

        self.provider.translate_full(&body)
    }

    /// One streaming round trip: decoded, translated deltas as they
    /// arrive. The stream ends after the terminal delta; exactly one
    /// delta carries `is_done` unless the turn fails first.
    pub async fn stream(&self, request: &Request) -> Result<ResponseStream, Error> {
        let (endpoint, headers, payload) = self.prepare(request).await?;

        tracing::debug!(provider = %self.provider.kind(), model = %request.model, "opening stream");
        let (status, bytes) = self
            .transport
            .send_streaming(&endpoint, &headers, &payload)
            .await?;

        if !(200..300).contains(&status) {
            let body = collect_body(bytes).await;
            tracing::error!(provider = %self.provider.kind(), status, "upstream stream refused");
            let delta = Response::from_error(format!("HTTP {status}: {body}"));
            return Ok(stream::iter(vec![delta]).boxed());
        }

        let state = StreamState {
            objects: bytes.json_objects(),
            translator: self.provider.chunk_translator(),
            done: false,
        };
        let deltas = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                match state.objects.next().await {
                    Some(Ok(object)) => {
                        let delta = state.translator.translate_chunk(&object);
                        if delta.is_empty() {
                            continue;
                        }
                        state.done = delta.is_done || delta.error.is_some();
                        return Some((delta, state));
                    }
                    Some(Err(err)) => {
                        state.done = true;
                        return Some((Response::from_error(err.to_string()), state));
                    }
                    None => {
                        state.done = true;
                        let flushed = state.translator.finish();
                        return flushed.map(|delta| (delta, state));
                    }
                }
            }
        });
        Ok(deltas.boxed())
    }

    /// Run the request to completion, streaming when asked to, and fold
    /// the deltas into one final response.
    pub async fn complete(&self, request: &Request) -> Result<Response, Error> {
        if !request.stream {
            return self.execute(request).await;
        }

        let mut deltas = self.stream(request).await?;
        let mut accumulator = ResponseAccumulator::new();
        while let Some(delta) = deltas.next().await {
            accumulator.push(&delta);
        }
        Ok(accumulator.into_response())
    }

    /// Run the full tool loop: execute requested tool calls, feed their
    /// results back, and repeat until the model answers in text or the
    /// round budget runs out. The final round disables tools so the
    /// model must produce an answer.
    pub async fn run_tool_loop(
        &self,
        request: &Request,
        max_rounds: usize,
    ) -> Result<Response, Error> {
        let executor = ToolExecutor::new(self.tools.clone());

        let mut current = request.clone();
        let mut response = self.complete(&current).await?;

        for round in 1..=max_rounds {
            if !ToolExecutor::requires_execution(&response) {
                break;
            }
            let calls = response.tool_calls.clone().unwrap_or_default();
            tracing::info!(round, calls = calls.len(), "executing tool round");

            let results = executor.execute_calls(&calls).await;
            let disable_tools = round == max_rounds;
            current = ToolExecutor::build_follow_up(&current, &response, &results, disable_tools);
            response = self.complete(&current).await?;
        }

        Ok(response)
    }

    /// Normalize the response's grounding metadata, if it carries any.
    pub fn citations(&self, response: &Response) -> Option<CitationData> {
        let grounding = response.grounding.as_ref()?;
        citations::normalize(self.provider.kind(), grounding, &response.content)
    }
}

struct StreamState {
    objects: JsonObjectStream<ByteStream>,
    translator: Box<dyn ChunkTranslator>,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::OpenAIProvider;
    use crate::registry::{ModelInfo, ToolStrategy};
    use crate::tools::Tool;
    use crate::types::{FinishReason, ToolDefinition};
    use bytes::Bytes;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Replays canned (status, body) responses in order.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<(u16, String)>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<(u16, String)>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }

        async fn next_response(&self) -> (u16, String) {
            self.responses
                .lock()
                .await
                .pop_front()
                .expect("transport script exhausted")
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn send_blocking(
            &self,
            _url: &str,
            _headers: &[(String, String)],
            _body: &Value,
        ) -> Result<(u16, String), Error> {
            Ok(self.next_response().await)
        }

        async fn send_streaming(
            &self,
            _url: &str,
            _headers: &[(String, String)],
            _body: &Value,
        ) -> Result<(u16, ByteStream), Error> {
            let (status, body) = self.next_response().await;
            let chunks: Vec<Result<Bytes, Error>> = vec![Ok(Bytes::from(body))];
            Ok((status, stream::iter(chunks).boxed()))
        }
    }

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
        registry.register(
            ModelInfo::new("gpt-4o")
                .with_tool("stream", ToolStrategy::Native)
                .with_tool("function_calling", ToolStrategy::Native),
        );
        Arc::new(registry)
    }

    fn client(responses: Vec<(u16, String)>) -> LlmClient {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(RollTool));
        LlmClient::new(
            Box::new(OpenAIProvider::new("sk-test")),
            Arc::new(ScriptedTransport::new(responses)),
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
    async fn test_execute_translates_blocking_response() {
        let body = json!({
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2}
        })
        .to_string();

        let client = client(vec![(200, body)]);
        let response = client.execute(&Request::new("gpt-4o").user("hi")).await.unwrap();

        assert_eq!(response.content, "Hello!");
        assert!(response.is_done);
        assert_eq!(response.usage.unwrap().input_tokens, 5);
    }

    #[tokio::test]
    async fn test_execute_wraps_http_failure_as_error_response() {
        let client = client(vec![(429, "slow down".to_string())]);
        let response = client.execute(&Request::new("gpt-4o").user("hi")).await.unwrap();

        assert!(response.error.as_deref().unwrap().contains("429"));
        assert!(!response.is_done);
    }

    #[tokio::test]
    async fn test_unknown_model_is_an_error() {
        let client = client(vec![]);
        let result = client.execute(&Request::new("o3-ultra").user("hi")).await;
        assert!(matches!(result, Err(Error::ModelNotFound(_))));
    }

    #[tokio::test]
    async fn test_stream_yields_deltas_then_single_terminal() {
        let body = sse(&[
            json!({"choices": [{"index": 0, "delta": {"content": "Hel"}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": "lo"}, "finish_reason": "stop"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 4, "completion_tokens": 2}}),
        ]);

        let client = client(vec![(200, body)]);
        let request = Request::new("gpt-4o").user("hi").streaming();
        let deltas: Vec<Response> = client.stream(&request).await.unwrap().collect().await;

        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[0].content, "Hel");
        assert_eq!(deltas[1].content, "lo");
        assert!(deltas[2].is_done);
        assert_eq!(deltas.iter().filter(|d| d.is_done).count(), 1);
    }

    #[tokio::test]
    async fn test_stream_flushes_terminal_when_usage_chunk_missing() {
        let body = sse(&[
            json!({"choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": "stop"}]}),
        ]);

        let client = client(vec![(200, body)]);
        let request = Request::new("gpt-4o").user("hi").streaming();
        let deltas: Vec<Response> = client.stream(&request).await.unwrap().collect().await;

        assert_eq!(deltas.len(), 2);
        assert!(deltas[1].is_done);
        assert_eq!(deltas[1].finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_stream_http_failure_becomes_error_delta() {
        let client = client(vec![(503, "upstream down".to_string())]);
        let request = Request::new("gpt-4o").user("hi").streaming();
        let deltas: Vec<Response> = client.stream(&request).await.unwrap().collect().await;

        assert_eq!(deltas.len(), 1);
        let error = deltas[0].error.as_deref().unwrap();
        assert!(error.contains("503"));
        assert!(error.contains("upstream down"));
    }

    #[tokio::test]
    async fn test_complete_folds_streamed_deltas() {
        let body = sse(&[
            json!({"choices": [{"index": 0, "delta": {"content": "Hello, "}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": "world"}, "finish_reason": "stop"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 4, "completion_tokens": 2}}),
        ]);

        let client = client(vec![(200, body)]);
        let request = Request::new("gpt-4o").user("hi").streaming();
        let response = client.complete(&request).await.unwrap();

        assert_eq!(response.content, "Hello, world");
        assert!(response.is_done);
        assert_eq!(response.usage.unwrap().output_tokens, 2);
    }

    #[tokio::test]
    async fn test_tool_loop_executes_and_answers() {
        let tool_round = json!({
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
        })
        .to_string();
        let answer_round = json!({
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"content": "You rolled a 4."},
                "finish_reason": "stop"
            }]
        })
        .to_string();

        let client = client(vec![(200, tool_round), (200, answer_round)]);
        let request = Request::new("gpt-4o").user("roll a die");
        let response = client.run_tool_loop(&request, 3).await.unwrap();

        assert_eq!(response.content, "You rolled a 4.");
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_tool_loop_respects_round_budget() {
        // The model keeps asking for tools; after max_rounds the loop
        // must stop asking and return whatever came back last.
        let tool_round = |id: &str| {
            json!({
                "object": "chat.completion",
                "choices": [{
                    "index": 0,
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": id,
                            "type": "function",
                            "function": {"name": "roll", "arguments": "{}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })
            .to_string()
        };

        let client = client(vec![
            (200, tool_round("call_1")),
            (200, tool_round("call_2")),
            (200, tool_round("call_3")),
        ]);
        let request = Request::new("gpt-4o").user("keep rolling");
        let response = client.run_tool_loop(&request, 2).await.unwrap();

        // Script had exactly three responses: initial + two rounds.
        assert!(response.has_tool_calls());
    }
}
