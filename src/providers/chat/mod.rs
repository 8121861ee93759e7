//! The OpenAI-compatible chat completions family.
//!
//! OpenAI itself and the GWDG academic gateway speak the same dialect;
//! the shared message conversion and stream translation live here while
//! the per-provider quirks (model remaps, greeting suppression, message
//! merging) stay in their own modules.

mod gwdg;
mod openai;
mod translator;
pub mod types;

pub use gwdg::GwdgProvider;
pub use openai::OpenAIProvider;
pub use translator::ChatChunkTranslator;

use base64::Engine;

use self::types::{ChatContent, ChatContentPart, ChatImageUrl, ChatMessage, ChatToolCall, ChatTool};
use crate::provider::ConvertContext;
use crate::types::{AttachmentKind, Message, Request, Role, ToolCall};
use crate::Error;

/// Convert internal messages to the chat completions wire shape.
pub(crate) async fn convert_messages(
    messages: &[Message],
    context: &ConvertContext<'_>,
) -> Result<Vec<ChatMessage>, Error> {
    let mut converted = Vec::with_capacity(messages.len());
    for message in messages {
        converted.push(convert_message(message, context).await?);
    }
    Ok(converted)
}

async fn convert_message(
    message: &Message,
    context: &ConvertContext<'_>,
) -> Result<ChatMessage, Error> {
    // Tool results go back as tool-role messages with string content.
    if message.role == Role::Tool {
        return Ok(ChatMessage {
            role: "tool".to_string(),
            content: Some(ChatContent::Text(message.text_content())),
            tool_calls: None,
            tool_call_id: message.tool_call_id.clone(),
        });
    }

    // Assistant turns that requested tools replay the calls verbatim;
    // content rides along only when non-empty.
    if message.role == Role::Assistant {
        if let Some(calls) = &message.tool_calls {
            let text = message.text_content();
            return Ok(ChatMessage {
                role: "assistant".to_string(),
                content: (!text.is_empty()).then_some(ChatContent::Text(text)),
                tool_calls: Some(wire_tool_calls(calls)),
                tool_call_id: None,
            });
        }
    }

    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => unreachable!("handled above"),
    };

    let mut parts = Vec::new();
    let text = message.text_content();
    if !text.is_empty() {
        parts.push(ChatContentPart::Text { text });
    }
    attach_parts(message, context, &mut parts).await;

    Ok(ChatMessage {
        role: role.to_string(),
        content: Some(ChatContent::Parts(parts)),
        tool_calls: None,
        tool_call_id: None,
    })
}

/// Inline the message's attachments as content parts, honoring model
/// capabilities. Unsupported attachments are skipped and noted in a
/// trailing text part so the model knows what it did not see.
async fn attach_parts(
    message: &Message,
    context: &ConvertContext<'_>,
    parts: &mut Vec<ChatContentPart>,
) {
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
                        parts.push(ChatContentPart::ImageUrl {
                            image_url: ChatImageUrl {
                                url: format!("data:{};base64,{}", attachment.mime_type, encoded),
                            },
                        });
                    }
                    Err(err) => {
                        tracing::error!(
                            attachment = %attachment.id,
                            error = %err,
                            "failed to inline image attachment"
                        );
                        parts.push(ChatContentPart::Text {
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
                    Ok(bytes) => {
                        parts.push(ChatContentPart::Text {
                            text: format!(
                                "[ATTACHED FILE: {}]\n---\n{}\n---",
                                attachment.name,
                                String::from_utf8_lossy(&bytes)
                            ),
                        });
                    }
                    Err(err) => {
                        tracing::error!(
                            attachment = %attachment.id,
                            error = %err,
                            "failed to inline document attachment"
                        );
                        parts.push(ChatContentPart::Text {
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
        parts.push(ChatContentPart::Text {
            text: format!(
                "[NOTE: The following attachments were not included because this model does not support them: {}]",
                skipped.join(", ")
            ),
        });
    }
}

/// Re-encode completed tool calls for history replay.
pub(crate) fn wire_tool_calls(calls: &[ToolCall]) -> Vec<ChatToolCall> {
    calls
        .iter()
        .map(|call| ChatToolCall {
            id: call.id.clone(),
            call_type: "function".to_string(),
            function: types::ChatFunction {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        })
        .collect()
}

/// Tools for the payload, or `None` when disabled or empty.
pub(crate) fn eligible_chat_tools(
    request: &Request,
    context: &ConvertContext<'_>,
) -> Option<Vec<ChatTool>> {
    if request.disable_tools || context.tools.is_empty() {
        return None;
    }
    Some(context.tools.iter().map(ChatTool::from).collect())
}

/// Some models reject a leading system message; downgrade it to user.
pub(crate) fn remap_first_system_to_user(messages: &mut [Message]) {
    if let Some(first) = messages.first_mut() {
        if first.role == Role::System {
            first.role = Role::User;
        }
    }
}
