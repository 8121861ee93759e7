//! GWDG academic cloud provider.
//!
//! Speaks the chat completions dialect, but the hosted open-weight
//! models need a few request-side repairs: Mixtral rejects the system
//! role and consecutive same-role messages, and trivially short
//! greetings go out without tool offers because several models answer
//! them with a spurious tool call instead of text.

use serde_json::Value;

use super::translator::translate_full_body;
use super::types::{ChatRequest, StreamOptions};
use super::{convert_messages, eligible_chat_tools, remap_first_system_to_user, ChatChunkTranslator};
use crate::provider::{ChunkTranslator, ConvertContext, Provider, ProviderKind};
use crate::types::{Message, Request, Response};
use crate::Error;

pub const DEFAULT_BASE_URL: &str = "https://chat-ai.academiccloud.de/v1";

const NO_SYSTEM_ROLE_MODELS: &[&str] = &["mixtral-8x7b-instruct"];

/// Last user turns that suppress tool offers.
const GREETINGS: &[&str] = &["hi", "hello", "hey", "hallo", "greetings"];

pub struct GwdgProvider {
    api_key: String,
    base_url: String,
}

impl GwdgProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn needs_role_repair(model_id: &str) -> bool {
        NO_SYSTEM_ROLE_MODELS.contains(&model_id)
    }

    fn is_greeting(request: &Request) -> bool {
        let Some(last) = request.last_user_message() else {
            return false;
        };
        let text = last.text_content().trim().to_lowercase();
        GREETINGS.contains(&text.as_str())
    }
}

/// Collapse runs of same-role messages into one message each, joining
/// their content parts in order. Tool plumbing never reaches models
/// that need this, so tool fields are not carried over.
fn merge_consecutive_same_role(messages: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        match merged.last_mut() {
            Some(last) if last.role == message.role => {
                last.content.extend(message.content);
            }
            _ => merged.push(message),
        }
    }
    merged
}

#[async_trait::async_trait]
impl Provider for GwdgProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gwdg
    }

    fn endpoint(&self, _model: &str, _stream: bool) -> String {
        format!("{}/chat/completions", self.base_url)
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
        let mut messages = request.messages.clone();
        if Self::needs_role_repair(&context.model.id) {
            remap_first_system_to_user(&mut messages);
            messages = merge_consecutive_same_role(messages);
        }

        let tools = if Self::is_greeting(request) {
            None
        } else {
            eligible_chat_tools(request, context)
        };

        let payload = ChatRequest {
            model: request.model.clone(),
            messages: convert_messages(&messages, context).await?,
            stream: request.stream,
            stream_options: request.stream.then_some(StreamOptions {
                include_usage: true,
            }),
            tools,
        };

        Ok(serde_json::to_value(payload)?)
    }

    fn translate_full(&self, body: &str) -> Result<Response, Error> {
        translate_full_body(body)
    }

    fn chunk_translator(&self) -> Box<dyn ChunkTranslator> {
        Box::new(ChatChunkTranslator::new())
    }
}
