//! Google Generative Language API provider.
//!
//! Gemini authenticates with a `key` query parameter instead of a
//! header, takes `alt=sse` on the streaming endpoint, and reports usage
//! only on the terminal chunk. Completion tokens are not reported
//! directly; they are derived as total minus prompt so reasoning tokens
//! are not silently lost.

pub mod types;

use base64::Engine;
use serde_json::{json, Value};

use self::types::{
    GoogleBlob, GoogleContent, GoogleFunctionCall, GoogleFunctionResponse, GoogleGenerationConfig,
    GooglePart, GoogleRequest, GoogleResponse, GoogleSafetySetting, GoogleSystemInstruction,
    GoogleUsageMetadata,
};
use crate::provider::{ChunkTranslator, ConvertContext, Provider, ProviderKind};
use crate::types::{AttachmentKind, FinishReason, Message, Request, Response, Role, ToolCall, Usage};
use crate::Error;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleProvider {
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
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
impl Provider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        if stream {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse&key={}",
                self.base_url, model, self.api_key
            )
        } else {
            format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, model, self.api_key
            )
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        // Auth lives in the URL.
        vec![("Content-Type".to_string(), "application/json".to_string())]
    }

    async fn convert_request(
        &self,
        request: &Request,
        context: &ConvertContext<'_>,
    ) -> Result<Value, Error> {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();
        // functionResponse parts name the function, not the call id.
        let mut call_names: std::collections::HashMap<String, String> =
            std::collections::HashMap::new();

        for message in &request.messages {
            match message.role {
                Role::System => {
                    let text = message.text_content();
                    if !text.is_empty() {
                        system_parts.push(GooglePart::Text { text });
                    }
                }
                Role::Tool => {
                    let call_id = message.tool_call_id.clone().unwrap_or_default();
                    let name = call_names.get(&call_id).cloned().unwrap_or(call_id);
                    contents.push(GoogleContent {
                        role: Some("user".to_string()),
                        parts: vec![GooglePart::FunctionResponse {
                            function_response: GoogleFunctionResponse {
                                name,
                                response: serde_json::from_str(&message.text_content())
                                    .unwrap_or_else(|_| json!({"content": message.text_content()})),
                            },
                        }],
                    });
                }
                Role::Assistant => {
                    let mut parts = Vec::new();
                    let text = message.text_content();
                    if !text.is_empty() {
                        parts.push(GooglePart::Text { text });
                    }
                    if let Some(calls) = &message.tool_calls {
                        for call in calls {
                            call_names.insert(call.id.clone(), call.name.clone());
                            parts.push(GooglePart::FunctionCall {
                                function_call: GoogleFunctionCall {
                                    name: call.name.clone(),
                                    args: call.arguments.clone(),
                                },
                            });
                        }
                    }
                    if !parts.is_empty() {
                        contents.push(GoogleContent {
                            role: Some("model".to_string()),
                            parts,
                        });
                    }
                }
                Role::User => {
                    let parts = convert_user_parts(message, context).await;
                    if !parts.is_empty() {
                        contents.push(GoogleContent {
                            role: Some("user".to_string()),
                            parts,
                        });
                    }
                }
            }
        }

        let payload = GoogleRequest {
            system_instruction: (!system_parts.is_empty()).then_some(GoogleSystemInstruction {
                parts: system_parts,
            }),
            contents,
            safety_settings: vec![GoogleSafetySetting {
                category: "HARM_CATEGORY_DANGEROUS_CONTENT".to_string(),
                threshold: "BLOCK_ONLY_HIGH".to_string(),
            }],
            generation_config: GoogleGenerationConfig::default(),
            tools: eligible_tools(request, context),
        };

        Ok(serde_json::to_value(payload)?)
    }

    fn translate_full(&self, body: &str) -> Result<Response, Error> {
        let parsed: GoogleResponse = serde_json::from_str(body)?;

        let mut response = Response {
            usage: parsed.usage_metadata.map(convert_usage),
            is_done: true,
            ..Response::default()
        };

        let Some(candidate) = parsed.candidates.into_iter().next() else {
            return Ok(response);
        };

        let mut calls = Vec::new();
        if let Some(content) = candidate.content {
            let mut index = 0;
            for part in content.parts {
                match part {
                    GooglePart::Text { text } => response.content.push_str(&text),
                    GooglePart::FunctionCall { function_call } => {
                        calls.push(function_call_to_tool_call(function_call, index));
                        index += 1;
                    }
                    _ => {}
                }
            }
        }

        response.finish_reason = if calls.is_empty() {
            candidate.finish_reason.as_deref().and_then(map_finish_reason)
        } else {
            Some(FinishReason::ToolCalls)
        };
        if let Some(grounding) = candidate.grounding_metadata {
            response = response.with_grounding(grounding);
        }
        Ok(response.with_tool_calls(calls))
    }

    fn chunk_translator(&self) -> Box<dyn ChunkTranslator> {
        Box::new(GoogleChunkTranslator::default())
    }
}

async fn convert_user_parts(message: &Message, context: &ConvertContext<'_>) -> Vec<GooglePart> {
    let mut parts = Vec::new();
    let text = message.text_content();
    if !text.is_empty() {
        parts.push(GooglePart::Text { text });
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
                    Ok(bytes) => parts.push(GooglePart::InlineData {
                        inline_data: GoogleBlob {
                            mime_type: attachment.mime_type.clone(),
                            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
                        },
                    }),
                    Err(err) => {
                        tracing::error!(
                            attachment = %attachment.id,
                            error = %err,
                            "failed to inline image attachment"
                        );
                        parts.push(GooglePart::Text {
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
                    Ok(bytes) => parts.push(GooglePart::Text {
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
                        parts.push(GooglePart::Text {
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
        parts.push(GooglePart::Text {
            text: format!(
                "[NOTE: The following attachments were not included because this model does not support them: {}]",
                skipped.join(", ")
            ),
        });
    }

    parts
}

/// Function declarations plus provider-native tools (Google Search).
fn eligible_tools(request: &Request, context: &ConvertContext<'_>) -> Option<Vec<Value>> {
    if request.disable_tools {
        return None;
    }

    let mut tools: Vec<Value> = Vec::new();
    if !context.tools.is_empty() {
        let declarations: Vec<Value> = context
            .tools
            .iter()
            .map(|definition| {
                json!({
                    "name": definition.name,
                    "description": definition.description,
                    "parameters": definition.parameters,
                })
            })
            .collect();
        tools.push(json!({"function_declarations": declarations}));
    }
    tools.extend(context.model.provider_tools.iter().cloned());

    (!tools.is_empty()).then_some(tools)
}

fn map_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "STOP" => Some(FinishReason::Stop),
        "MAX_TOKENS" => Some(FinishReason::Length),
        "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

fn convert_usage(metadata: GoogleUsageMetadata) -> Usage {
    Usage {
        input_tokens: metadata.prompt_token_count,
        // No direct completion count on the wire; everything that is
        // not prompt (including thoughts) counts as output.
        output_tokens: metadata
            .total_token_count
            .saturating_sub(metadata.prompt_token_count),
        reasoning_tokens: metadata.thoughts_token_count,
        cached_tokens: metadata.cached_content_token_count,
        tool_use_prompt_tokens: metadata.tool_use_prompt_token_count,
        ..Default::default()
    }
}

fn function_call_to_tool_call(call: GoogleFunctionCall, index: u32) -> ToolCall {
    let arguments = if call.args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        call.args
    };
    ToolCall::function(format!("tool-{index}"), call.name, arguments, index)
}

/// Translates Generative Language stream chunks into response deltas.
///
/// A chunk whose candidate carries a `finishReason` other than
/// `FINISH_REASON_UNSPECIFIED` is terminal; its text still goes out on
/// the same delta along with usage and any grounding metadata seen.
#[derive(Default)]
pub struct GoogleChunkTranslator {
    calls: Vec<ToolCall>,
    grounding: Option<Value>,
    grounding_queries: u32,
    finished: bool,
}

impl ChunkTranslator for GoogleChunkTranslator {
    fn translate_chunk(&mut self, raw: &str) -> Response {
        if self.finished {
            return Response::empty();
        }

        let chunk: GoogleResponse = match serde_json::from_str(raw) {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unparseable Google stream chunk");
                return Response::empty();
            }
        };

        let mut delta = Response::empty();
        let usage = chunk.usage_metadata;

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return delta;
        };

        if let Some(content) = candidate.content {
            for part in content.parts {
                match part {
                    GooglePart::Text { text } => delta.content.push_str(&text),
                    GooglePart::FunctionCall { function_call } => {
                        let index = self.calls.len() as u32;
                        self.calls.push(function_call_to_tool_call(function_call, index));
                    }
                    _ => {}
                }
            }
        }

        if let Some(metadata) = candidate.grounding_metadata {
            if let Some(queries) = metadata.get("webSearchQueries").and_then(Value::as_array) {
                self.grounding_queries += queries.len() as u32;
            }
            self.grounding = Some(metadata);
        }

        let terminal = candidate
            .finish_reason
            .as_deref()
            .is_some_and(|reason| reason != "FINISH_REASON_UNSPECIFIED");
        if terminal {
            self.finished = true;
            delta.is_done = true;
            delta.finish_reason = if self.calls.is_empty() {
                candidate.finish_reason.as_deref().and_then(map_finish_reason)
            } else {
                Some(FinishReason::ToolCalls)
            };
            delta.usage = usage.map(|metadata| {
                let mut usage = convert_usage(metadata);
                if self.grounding_queries > 0 {
                    usage.grounding_queries = Some(self.grounding_queries);
                }
                usage
            });
            delta = delta.with_tool_calls(std::mem::take(&mut self.calls));
            if let Some(grounding) = self.grounding.take() {
                delta = delta.with_grounding(grounding);
            }
        }

        delta
    }
}
