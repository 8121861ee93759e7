//! Anthropic Messages API provider.
//!
//! The Messages API moves the system prompt out of the message list,
//! requires `max_tokens`, and streams typed events instead of chat
//! completion chunks. Tool use arrives as `tool_use` content blocks
//! whose arguments stream as `input_json_delta` fragments.

pub mod types;

use base64::Engine;
use serde_json::{json, Value};

use self::types::{
    AnthropicBlockStart, AnthropicContentBlock, AnthropicDelta, AnthropicImageSource,
    AnthropicMessage, AnthropicRequest, AnthropicResponse, AnthropicResponseBlock,
    AnthropicStreamEvent, AnthropicUsage,
};
use crate::accumulator::ToolCallAccumulator;
use crate::provider::{ChunkTranslator, ConvertContext, Provider, ProviderKind};
use crate::types::{
    AttachmentKind, FinishReason, Message, Request, Response, Role, ToolCall, ToolCallFragment,
    Usage,
};
use crate::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
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
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn endpoint(&self, _model: &str, _stream: bool) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("x-api-key".to_string(), self.api_key.clone()),
            ("anthropic-version".to_string(), API_VERSION.to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]
    }

    async fn convert_request(
        &self,
        request: &Request,
        context: &ConvertContext<'_>,
    ) -> Result<Value, Error> {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();

        for message in &request.messages {
            match message.role {
                Role::System => {
                    let text = message.text_content();
                    if !text.is_empty() {
                        system_parts.push(text);
                    }
                }
                Role::Tool => messages.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: vec![AnthropicContentBlock::ToolResult {
                        tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                        content: message.text_content(),
                    }],
                }),
                Role::Assistant => {
                    let mut content = Vec::new();
                    let text = message.text_content();
                    if !text.is_empty() {
                        content.push(AnthropicContentBlock::Text { text });
                    }
                    if let Some(calls) = &message.tool_calls {
                        for call in calls {
                            content.push(AnthropicContentBlock::ToolUse {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                input: call.arguments.clone(),
                            });
                        }
                    }
                    if !content.is_empty() {
                        messages.push(AnthropicMessage {
                            role: "assistant".to_string(),
                            content,
                        });
                    }
                }
                Role::User => {
                    let content = convert_user_content(message, context).await;
                    if !content.is_empty() {
                        messages.push(AnthropicMessage {
                            role: "user".to_string(),
                            content,
                        });
                    }
                }
            }
        }

        let max_tokens = context
            .model
            .metadata
            .get("max_tokens")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let payload = AnthropicRequest {
            model: request.model.clone(),
            max_tokens,
            messages,
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            stream: request.stream,
            tools: eligible_tools(request, context),
        };

        Ok(serde_json::to_value(payload)?)
    }

    fn translate_full(&self, body: &str) -> Result<Response, Error> {
        let parsed: AnthropicResponse = serde_json::from_str(body)?;

        let mut content = String::new();
        let mut calls = Vec::new();
        for (index, block) in parsed.content.into_iter().enumerate() {
            match block {
                AnthropicResponseBlock::Text { text } => content.push_str(&text),
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    calls.push(ToolCall::function(id, name, input, index as u32));
                }
                AnthropicResponseBlock::Unknown => {}
            }
        }

        let mut response = Response {
            content,
            finish_reason: parsed.stop_reason.as_deref().and_then(map_stop_reason),
            usage: parsed.usage.map(convert_usage),
            is_done: true,
            ..Response::default()
        };
        response = response.with_tool_calls(calls);
        Ok(response)
    }

    fn chunk_translator(&self) -> Box<dyn ChunkTranslator> {
        Box::new(AnthropicChunkTranslator::default())
    }
}

async fn convert_user_content(
    message: &Message,
    context: &ConvertContext<'_>,
) -> Vec<AnthropicContentBlock> {
    let mut content = Vec::new();
    let text = message.text_content();
    if !text.is_empty() {
        content.push(AnthropicContentBlock::Text { text });
    }

    let mut skipped = Vec::new();
    for attachment in message.attachments() {
        match attachment.kind {
            AttachmentKind::Image => {
                if !context.model.can_process_image() {
                    skipped.push(format!("{} (image not supported)", attachment.name));
                    continue;
                }
                match context.attachments.retrieve(attachment).await {
                    Ok(bytes) => {
                        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                        content.push(AnthropicContentBlock::Image {
                            source: AnthropicImageSource::base64(
                                attachment.mime_type.clone(),
                                encoded,
                            ),
                        });
                    }
                    Err(err) => {
                        tracing::error!(
                            attachment = %attachment.id,
                            error = %err,
                            "failed to inline image attachment"
                        );
                        content.push(AnthropicContentBlock::Text {
                            text: format!(
                                "[ERROR: Could not process image attachment: {}]",
                                attachment.name
                            ),
                        });
                    }
                }
            }
            AttachmentKind::Document => {
                if !context.model.can_process_document() {
                    skipped.push(format!("{} (file upload not supported)", attachment.name));
                    continue;
                }
                match context.attachments.retrieve(attachment).await {
                    Ok(bytes) => content.push(AnthropicContentBlock::Text {
                        text: format!(
                            "[ATTACHED FILE: {}]\n---\n{}\n---",
                            attachment.name,
                            String::from_utf8_lossy(&bytes)
                        ),
                    }),
                    Err(err) => {
                        tracing::error!(
                            attachment = %attachment.id,
                            error = %err,
                            "failed to inline document attachment"
                        );
                        content.push(AnthropicContentBlock::Text {
                            text: format!(
                                "[ERROR: Could not process document attachment: {}]",
                                attachment.name
                            ),
                        });
                    }
                }
            }
        }
    }

    if !skipped.is_empty() {
        content.push(AnthropicContentBlock::Text {
            text: format!(
                "[NOTE: The following attachments were not included because this model does not support them: {}]",
                skipped.join(", ")
            ),
        });
    }

    content
}

/// Function tools in the flat `input_schema` shape, plus any
/// provider-native tools (web search) the model record carries.
fn eligible_tools(request: &Request, context: &ConvertContext<'_>) -> Option<Vec<Value>> {
    if request.disable_tools {
        return None;
    }

    let mut tools: Vec<Value> = context
        .tools
        .iter()
        .map(|definition| {
            json!({
                "name": definition.name,
                "description": definition.description,
                "input_schema": definition.parameters,
            })
        })
        .collect();
    tools.extend(context.model.provider_tools.iter().cloned());

    (!tools.is_empty()).then_some(tools)
}

fn map_stop_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "end_turn" | "stop_sequence" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        _ => None,
    }
}

fn convert_usage(usage: AnthropicUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        ..Default::default()
    }
}

/// Translates Messages API stream events into response deltas.
///
/// `message_start` carries input tokens, `message_delta` the stop
/// reason and output tokens; the terminal delta goes out on
/// `message_stop` so everything learned along the way rides on it.
#[derive(Default)]
pub struct AnthropicChunkTranslator {
    accumulator: ToolCallAccumulator,
    input_tokens: u32,
    output_tokens: u32,
    stop_reason: Option<FinishReason>,
    citations: Vec<Value>,
    finished: bool,
}

impl ChunkTranslator for AnthropicChunkTranslator {
    fn translate_chunk(&mut self, raw: &str) -> Response {
        if self.finished {
            return Response::empty();
        }

        let event: AnthropicStreamEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unparseable Anthropic stream event");
                return Response::empty();
            }
        };

        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens;
                }
                Response::empty()
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                match content_block {
                    AnthropicBlockStart::Text { text } if !text.is_empty() => {
                        return Response::content_delta(text);
                    }
                    AnthropicBlockStart::ToolUse { id, name } => {
                        self.accumulator.ingest(&ToolCallFragment {
                            index,
                            id: Some(id),
                            name: Some(name),
                            arguments: None,
                        });
                    }
                    AnthropicBlockStart::WebSearchToolResult { content } => {
                        if let Some(results) = content.as_array() {
                            for result in results {
                                self.citations.push(json!({
                                    "url": result.get("url").cloned().unwrap_or(Value::Null),
                                    "title": result.get("title").cloned().unwrap_or(Value::Null),
                                }));
                            }
                        }
                    }
                    _ => {}
                }
                Response::empty()
            }
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicDelta::TextDelta { text } => Response::content_delta(text),
                AnthropicDelta::InputJsonDelta { partial_json } => {
                    self.accumulator.ingest(&ToolCallFragment {
                        index,
                        id: None,
                        name: None,
                        arguments: Some(partial_json),
                    });
                    Response::empty()
                }
                AnthropicDelta::CitationsDelta { citation } => {
                    self.citations.push(citation);
                    Response::empty()
                }
                AnthropicDelta::Unknown => Response::empty(),
            },
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason.as_deref() {
                    self.stop_reason = map_stop_reason(reason);
                }
                if let Some(usage) = usage {
                    self.output_tokens = usage.output_tokens;
                }
                Response::empty()
            }
            AnthropicStreamEvent::MessageStop => {
                self.finished = true;
                let usage = Usage {
                    input_tokens: self.input_tokens,
                    output_tokens: self.output_tokens,
                    ..Default::default()
                };
                let mut response = Response::done(self.stop_reason.take(), Some(usage))
                    .with_tool_calls(self.accumulator.finalize());
                if !self.citations.is_empty() {
                    response = response.with_grounding(json!({
                        "citations": std::mem::take(&mut self.citations),
                    }));
                }
                response
            }
            AnthropicStreamEvent::Error { error } => {
                self.finished = true;
                Response::from_error(format!("{}: {}", error.error_type, error.message))
            }
            AnthropicStreamEvent::ContentBlockStop { .. }
            | AnthropicStreamEvent::Ping
            | AnthropicStreamEvent::Unknown => Response::empty(),
        }
    }
}
