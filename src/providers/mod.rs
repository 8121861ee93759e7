//! Provider adapters for the supported wire dialects.

pub mod anthropic;
pub mod chat;
pub mod google;
pub mod responses;

pub use anthropic::AnthropicProvider;
pub use chat::{GwdgProvider, OpenAIProvider};
pub use google::GoogleProvider;
pub use responses::ResponsesProvider;
