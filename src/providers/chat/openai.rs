//! OpenAI chat completions provider.

use serde_json::Value;

use super::translator::translate_full_body;
use super::types::{ChatRequest, StreamOptions};
use super::{convert_messages, eligible_chat_tools, remap_first_system_to_user, ChatChunkTranslator};
use crate::provider::{ChunkTranslator, ConvertContext, Provider, ProviderKind};
use crate::types::{Request, Response};
use crate::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Models that reject the system role outright.
const NO_SYSTEM_ROLE_MODELS: &[&str] = &["o1-mini"];

pub struct OpenAIProvider {
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
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
impl Provider for OpenAIProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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
        if NO_SYSTEM_ROLE_MODELS.contains(&context.model.id.as_str()) {
            remap_first_system_to_user(&mut messages);
        }

        let payload = ChatRequest {
            model: request.model.clone(),
            messages: convert_messages(&messages, context).await?,
            stream: request.stream,
            stream_options: request.stream.then_some(StreamOptions {
                include_usage: true,
            }),
            tools: eligible_chat_tools(request, context),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ModelInfo, ToolStrategy};
    use crate::transport::InMemoryAttachmentStore;
    use crate::types::ToolDefinition;
    use serde_json::json;

    fn context_for<'a>(
        model: &'a ModelInfo,
        store: &'a InMemoryAttachmentStore,
        tools: &'a [ToolDefinition],
    ) -> ConvertContext<'a> {
        ConvertContext {
            model,
            attachments: store,
            tools,
            mcp_servers: &[],
        }
    }

    #[tokio::test]
    async fn test_streaming_request_asks_for_usage() {
        let provider = OpenAIProvider::new("sk-test");
        let model = ModelInfo::new("gpt-4o");
        let store = InMemoryAttachmentStore::new();
        let request = Request::new("gpt-4o").user("hi").streaming();

        let payload = provider
            .convert_request(&request, &context_for(&model, &store, &[]))
            .await
            .unwrap();

        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["stream"], json!(true));
        assert_eq!(payload["stream_options"]["include_usage"], json!(true));
        assert!(payload.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_blocking_request_omits_stream_options() {
        let provider = OpenAIProvider::new("sk-test");
        let model = ModelInfo::new("gpt-4o");
        let store = InMemoryAttachmentStore::new();
        let request = Request::new("gpt-4o").user("hi");

        let payload = provider
            .convert_request(&request, &context_for(&model, &store, &[]))
            .await
            .unwrap();

        assert_eq!(payload["stream"], json!(false));
        assert!(payload.get("stream_options").is_none());
    }

    #[tokio::test]
    async fn test_o1_mini_system_message_becomes_user() {
        let provider = OpenAIProvider::new("sk-test");
        let model = ModelInfo::new("o1-mini");
        let store = InMemoryAttachmentStore::new();
        let request = Request::new("o1-mini").system("be brief").user("hi");

        let payload = provider
            .convert_request(&request, &context_for(&model, &store, &[]))
            .await
            .unwrap();

        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["messages"][1]["role"], "user");
    }

    #[tokio::test]
    async fn test_tools_serialize_in_nested_function_shape() {
        let provider = OpenAIProvider::new("sk-test");
        let model = ModelInfo::new("gpt-4o").with_tool("function_calling", ToolStrategy::Native);
        let store = InMemoryAttachmentStore::new();
        let tools = vec![ToolDefinition::new(
            "roll",
            "Roll dice",
            json!({"type": "object", "properties": {"dice": {"type": "integer"}}}),
        )];
        let request = Request::new("gpt-4o").user("roll one");

        let payload = provider
            .convert_request(&request, &context_for(&model, &store, &tools))
            .await
            .unwrap();

        assert_eq!(payload["tools"][0]["type"], "function");
        assert_eq!(payload["tools"][0]["function"]["name"], "roll");
    }

    #[test]
    fn test_endpoint_and_headers() {
        let provider = OpenAIProvider::new("sk-test");
        assert_eq!(
            provider.endpoint("gpt-4o", true),
            "https://api.openai.com/v1/chat/completions"
        );
        let headers = provider.headers();
        assert!(headers
            .iter()
            .any(|(k, v)| k == "Authorization" && v == "Bearer sk-test"));
    }
}
