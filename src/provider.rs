//! The provider seam: request conversion and response translation.
//!
//! Each supported provider implements [`Provider`] to turn the internal
//! [`Request`] into its wire payload and to translate wire responses
//! back into the internal [`Response`] shape. Streaming translation is
//! stateful, so each stream gets its own [`ChunkTranslator`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::registry::ModelInfo;
use crate::tools::McpServerConfig;
use crate::transport::AttachmentStore;
use crate::types::{Request, Response, ToolDefinition};
use crate::Error;

/// The wire dialects this crate speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai_responses")]
    OpenAiResponses,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
    #[serde(rename = "gwdg")]
    Gwdg,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenAiResponses => "openai_responses",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::Gwdg => "gwdg",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a converter may consult besides the request itself.
pub struct ConvertContext<'a> {
    /// Capability record for the requested model.
    pub model: &'a ModelInfo,
    /// Resolves attachment references to raw bytes.
    pub attachments: &'a dyn AttachmentStore,
    /// Function-calling tool definitions eligible for this request.
    pub tools: &'a [ToolDefinition],
    /// MCP servers forwarded to providers with native MCP support.
    pub mcp_servers: &'a [McpServerConfig],
}

/// A provider adapter: payload conversion out, response translation in.
#[async_trait::async_trait]
pub trait Provider: Send + Sync + 'static {
    fn kind(&self) -> ProviderKind;

    /// Full request URL for the given model, including any auth or
    /// streaming query parameters the provider wants in the URL.
    fn endpoint(&self, model: &str, stream: bool) -> String;

    /// Authentication and dialect headers for every request.
    fn headers(&self) -> Vec<(String, String)>;

    /// Build the provider wire payload for a request.
    async fn convert_request(
        &self,
        request: &Request,
        context: &ConvertContext<'_>,
    ) -> Result<Value, Error>;

    /// Translate a complete (non-streamed) response body.
    fn translate_full(&self, body: &str) -> Result<Response, Error>;

    /// Fresh per-stream translator state.
    fn chunk_translator(&self) -> Box<dyn ChunkTranslator>;
}

/// Stateful translation of one stream's decoded JSON objects.
///
/// Implementations never fail: a chunk that cannot be understood
/// translates to an empty non-terminal delta so the stream keeps
/// flowing.
pub trait ChunkTranslator: Send {
    /// Translate one decoded JSON object into a response delta.
    fn translate_chunk(&mut self, raw: &str) -> Response;

    /// Flush any pending terminal state once the byte stream ends.
    ///
    /// Providers that signal completion in-band never need this; it
    /// covers streams that end without a terminal chunk.
    fn finish(&mut self) -> Option<Response> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_serde_names() {
        let kind: ProviderKind = serde_json::from_str("\"openai_responses\"").unwrap();
        assert_eq!(kind, ProviderKind::OpenAiResponses);
        assert_eq!(
            serde_json::to_string(&ProviderKind::Gwdg).unwrap(),
            "\"gwdg\""
        );
        assert_eq!(ProviderKind::Anthropic.to_string(), "anthropic");
    }
}
