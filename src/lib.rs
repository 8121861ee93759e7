//! A normalization layer over multiple LLM provider APIs.
//!
//! `llm-relay` converts a provider-neutral [`Request`] into each provider's
//! wire format, decodes streamed and blocking responses back into uniform
//! [`Response`] deltas, and runs tool-calling loops and citation
//! normalization on top. OpenAI Chat Completions, the OpenAI Responses API,
//! Anthropic Messages, Google Generative Language, and the GWDG academic
//! cloud are supported.

pub mod accumulator;
pub mod citations;
pub mod client;
pub mod decoder;
pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod tools;
pub mod transport;
pub mod types;

pub use accumulator::{ResponseAccumulator, ToolCallAccumulator};
pub use citations::{Citation, CitationData, CitationMode, SearchMetadata, TextSegment};
pub use client::{LlmClient, ResponseStream};
pub use decoder::{ChunkDecoder, JsonObjectStream, JsonObjectStreamExt};
pub use error::Error;
pub use factory::{ProviderConfig, ProviderFactory};
pub use provider::{ChunkTranslator, ConvertContext, Provider, ProviderKind};
pub use providers::*;
pub use registry::{ModelInfo, ModelRegistry, ToolStrategy};
pub use tools::{McpServerConfig, Tool, ToolExecutor, ToolRegistry};
pub use transport::{AttachmentStore, ByteStream, HttpTransport, InMemoryAttachmentStore, Transport};
pub use types::*;
