use thiserror::Error;

/// Errors that can occur when using the llm-relay library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Attachment error: {0}")]
    Attachment(String),

    #[error("Model not configured: {0}")]
    ModelNotFound(String),
}

impl Error {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode(message.into())
    }

    pub fn tool(message: impl Into<String>) -> Self {
        Error::Tool(message.into())
    }

    pub fn attachment(message: impl Into<String>) -> Self {
        Error::Attachment(message.into())
    }
}
