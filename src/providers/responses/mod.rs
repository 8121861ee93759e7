//! OpenAI Responses API provider.
//!
//! The Responses API replaces the chat message list with typed input
//! items, moves the system prompt into `instructions`, and streams
//! semantic `response.*` events. Function-calling tools are flat (no
//! nested `function` object) and MCP servers forward natively.

pub mod types;

use serde_json::{json, Value};

use self::types::{
    ResponsesInput, ResponsesInputItem, ResponsesOutputContent, ResponsesOutputItem,
    ResponsesReasoning, ResponsesRequest, ResponsesResponse, ResponsesStreamEvent, ResponsesUsage,
};
use crate::accumulator::ToolCallAccumulator;
use crate::provider::{ChunkTranslator, ConvertContext, Provider, ProviderKind};
use crate::types::{FinishReason, Request, Response, Role, ToolCall, ToolCallFragment, Usage};
use crate::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct ResponsesProvider {
    api_key: String,
    base_url: String,
}

impl ResponsesProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ResponsesProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiResponses
    }

    fn endpoint(&self, _model: &str, _stream: bool) -> String {
        format!("{}/responses", self.base_url)
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]
    }

    async fn convert_request(
        &self,
        request: &Request,
        context: &ConvertContext<'_>,
    ) -> Result<Value, Error> {
        let mut instructions: Vec<String> = Vec::new();
        let mut items: Vec<ResponsesInputItem> = Vec::new();

        for message in &request.messages {
            match message.role {
                Role::System => {
                    let text = message.text_content();
                    if !text.is_empty() {
                        instructions.push(text);
                    }
                }
                Role::Tool => items.push(ResponsesInputItem::FunctionCallOutput {
                    call_id: message.tool_call_id.clone().unwrap_or_default(),
                    output: message.text_content(),
                }),
                Role::Assistant => {
                    let text = message.text_content();
                    if !text.is_empty() {
                        items.push(ResponsesInputItem::Message {
                            role: "assistant".to_string(),
                            content: text,
                        });
                    }
                    if let Some(calls) = &message.tool_calls {
                        for call in calls {
                            items.push(ResponsesInputItem::FunctionCall {
                                call_id: call.id.clone(),
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            });
                        }
                    }
                }
                Role::User => items.push(ResponsesInputItem::Message {
                    role: "user".to_string(),
                    content: message.text_content(),
                }),
            }
        }

        let input = match items.as_slice() {
            [ResponsesInputItem::Message { role, content }] if role == "user" => {
                ResponsesInput::Text(content.clone())
            }
            _ => ResponsesInput::Items(items),
        };

        let payload = ResponsesRequest {
            model: request.model.clone(),
            input,
            store: false,
            stream: request.stream,
            instructions: (!instructions.is_empty()).then(|| instructions.join("\n\n")),
            reasoning: reasoning_for(&request.model),
            tools: eligible_tools(request, context),
        };

        Ok(serde_json::to_value(payload)?)
    }

    fn translate_full(&self, body: &str) -> Result<Response, Error> {
        let parsed: ResponsesResponse = serde_json::from_str(body)?;

        if let Some(error) = &parsed.error {
            return Ok(Response::from_error(format!(
                "{}: {}",
                error.code, error.message
            )));
        }

        let mut content = String::new();
        let mut annotations = Vec::new();
        let mut calls = Vec::new();

        for (index, item) in parsed.output.into_iter().enumerate() {
            match item {
                ResponsesOutputItem::Message { content: blocks } => {
                    for block in blocks {
                        if let ResponsesOutputContent::OutputText {
                            text,
                            annotations: block_annotations,
                        } = block
                        {
                            content.push_str(&text);
                            annotations.extend(block_annotations);
                        }
                    }
                }
                ResponsesOutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => {
                    let arguments: Value = if arguments.trim().is_empty() {
                        Value::Object(serde_json::Map::new())
                    } else {
                        serde_json::from_str(&arguments).unwrap_or(Value::Null)
                    };
                    if arguments.is_null() {
                        tracing::warn!(tool = %name, "dropping tool call with undecodable arguments");
                        continue;
                    }
                    let index = index as u32;
                    calls.push(ToolCall::function(
                        call_id.unwrap_or_else(|| format!("tool-{index}")),
                        name,
                        arguments,
                        index,
                    ));
                }
                ResponsesOutputItem::Unknown => {}
            }
        }

        let mut response = Response {
            content,
            finish_reason: Some(if calls.is_empty() {
                FinishReason::Stop
            } else {
                FinishReason::ToolCalls
            }),
            usage: parsed.usage.map(convert_usage),
            is_done: true,
            ..Response::default()
        };
        response = response.with_tool_calls(calls);
        if !annotations.is_empty() {
            response = response.with_grounding(json!({"annotations": annotations}));
        }
        Ok(response)
    }

    fn chunk_translator(&self) -> Box<dyn ChunkTranslator> {
        Box::new(ResponsesChunkTranslator::default())
    }
}

/// GPT-5 and GPT-4.1 families take a reasoning effort hint.
fn reasoning_for(model: &str) -> Option<ResponsesReasoning> {
    if model.starts_with("gpt-5") {
        Some(ResponsesReasoning {
            effort: "medium".to_string(),
        })
    } else if model.starts_with("gpt-4.1") {
        Some(ResponsesReasoning {
            effort: "low".to_string(),
        })
    } else {
        None
    }
}

/// Flat function tools, provider-native tools, and MCP servers.
fn eligible_tools(request: &Request, context: &ConvertContext<'_>) -> Option<Vec<Value>> {
    if request.disable_tools {
        return None;
    }

    let mut tools: Vec<Value> = context
        .tools
        .iter()
        .map(|definition| {
            json!({
                "type": "function",
                "name": definition.name,
                "description": definition.description,
                "parameters": definition.parameters,
                "strict": definition.strict,
            })
        })
        .collect();
    tools.extend(context.model.provider_tools.iter().cloned());

    if context.model.supports_mcp_tools() {
        for server in context.mcp_servers {
            tools.push(json!({
                "type": "mcp",
                "server_label": server.label,
                "server_url": server.url,
                "require_approval": server.require_approval,
            }));
        }
    }

    (!tools.is_empty()).then_some(tools)
}

fn convert_usage(usage: ResponsesUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        reasoning_tokens: usage
            .output_tokens_details
            .map(|details| details.reasoning_tokens),
        cached_tokens: usage
            .input_tokens_details
            .map(|details| details.cached_tokens),
        ..Default::default()
    }
}

/// Translates `response.*` stream events into response deltas.
///
/// Function call names arrive on `response.output_item.added`, their
/// arguments via `response.function_call_arguments.delta` keyed by
/// output index; usage appears only inside `response.completed`.
#[derive(Default)]
pub struct ResponsesChunkTranslator {
    accumulator: ToolCallAccumulator,
    annotations: Vec<Value>,
    saw_function_call: bool,
    finished: bool,
}

impl ChunkTranslator for ResponsesChunkTranslator {
    fn translate_chunk(&mut self, raw: &str) -> Response {
        if self.finished {
            return Response::empty();
        }

        let event: ResponsesStreamEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unparseable Responses stream event");
                return Response::empty();
            }
        };

        match event.event_type.as_str() {
            "response.output_text.delta" => {
                Response::content_delta(event.delta.unwrap_or_default())
            }
            "response.output_item.added" => {
                if let Some(ResponsesOutputItem::FunctionCall { call_id, name, .. }) = event.item {
                    self.saw_function_call = true;
                    self.accumulator.ingest(&ToolCallFragment {
                        index: event.output_index.unwrap_or_default(),
                        id: call_id,
                        name: Some(name),
                        arguments: None,
                    });
                }
                Response::empty()
            }
            "response.function_call_arguments.delta" => {
                self.accumulator.ingest(&ToolCallFragment {
                    index: event.output_index.unwrap_or_default(),
                    id: None,
                    name: None,
                    arguments: event.delta,
                });
                Response::empty()
            }
            "response.output_text.annotation.added" => {
                if let Some(annotation) = event.annotation {
                    self.annotations.push(annotation);
                }
                Response::empty()
            }
            "response.completed" => {
                self.finished = true;
                let usage = event
                    .response
                    .and_then(|response| response.usage)
                    .map(convert_usage);
                let finish = if self.saw_function_call {
                    FinishReason::ToolCalls
                } else {
                    FinishReason::Stop
                };
                let mut response = Response::done(Some(finish), usage)
                    .with_tool_calls(self.accumulator.finalize());
                if !self.annotations.is_empty() {
                    response = response.with_grounding(json!({
                        "annotations": std::mem::take(&mut self.annotations),
                    }));
                }
                response
            }
            "response.failed" | "error" => {
                self.finished = true;
                let message = event
                    .response
                    .and_then(|response| response.error)
                    .map(|error| format!("{}: {}", error.code, error.message))
                    .or(event.message)
                    .unwrap_or_else(|| "response failed".to_string());
                Response::from_error(message)
            }
            _ => Response::empty(),
        }
    }
}
