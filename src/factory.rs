//! Provider construction from configuration or the environment.

use std::env;

use crate::provider::{Provider, ProviderKind};
use crate::providers::{
    AnthropicProvider, GoogleProvider, GwdgProvider, OpenAIProvider, ResponsesProvider,
};
use crate::Error;

/// Configuration for creating one provider adapter.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    /// Override the provider's default API base URL.
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            base_url: None,
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::OpenAi, api_key)
    }

    pub fn openai_responses(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::OpenAiResponses, api_key)
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::Anthropic, api_key)
    }

    pub fn google(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::Google, api_key)
    }

    pub fn gwdg(api_key: impl Into<String>) -> Self {
        Self::new(ProviderKind::Gwdg, api_key)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Read configuration from environment variables.
    ///
    /// `PROVIDER_TYPE` selects the provider; its API key comes from the
    /// matching `*_API_KEY` variable. Without `PROVIDER_TYPE`, the first
    /// key found wins, checked in the order OpenAI, Anthropic, Google,
    /// GWDG.
    pub fn from_env() -> Result<Self, Error> {
        if let Ok(provider_type) = env::var("PROVIDER_TYPE") {
            let (kind, key_var) = match provider_type.to_lowercase().as_str() {
                "openai" => (ProviderKind::OpenAi, "OPENAI_API_KEY"),
                "openai_responses" => (ProviderKind::OpenAiResponses, "OPENAI_API_KEY"),
                "anthropic" => (ProviderKind::Anthropic, "ANTHROPIC_API_KEY"),
                "google" => (ProviderKind::Google, "GOOGLE_API_KEY"),
                "gwdg" => (ProviderKind::Gwdg, "GWDG_API_KEY"),
                other => {
                    return Err(Error::config(format!(
                        "Invalid PROVIDER_TYPE '{other}'. Valid values are: openai, openai_responses, anthropic, google, gwdg"
                    )));
                }
            };
            let api_key = env::var(key_var).map_err(|_| {
                Error::config(format!(
                    "{key_var} environment variable is required for the {provider_type} provider"
                ))
            })?;
            let mut config = Self::new(kind, api_key);
            if let Ok(base_url) = env::var("PROVIDER_BASE_URL") {
                config = config.with_base_url(base_url);
            }
            return Ok(config);
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            return Ok(Self::openai(api_key));
        }
        if let Ok(api_key) = env::var("ANTHROPIC_API_KEY") {
            return Ok(Self::anthropic(api_key));
        }
        if let Ok(api_key) = env::var("GOOGLE_API_KEY") {
            return Ok(Self::google(api_key));
        }
        if let Ok(api_key) = env::var("GWDG_API_KEY") {
            return Ok(Self::gwdg(api_key));
        }

        Err(Error::config(
            "No API credentials found in environment. Set PROVIDER_TYPE and the matching *_API_KEY variable",
        ))
    }
}

/// Builds provider adapters from configuration.
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(config: &ProviderConfig) -> Box<dyn Provider> {
        let key = config.api_key.clone();
        match (config.kind, &config.base_url) {
            (ProviderKind::OpenAi, Some(url)) => Box::new(OpenAIProvider::with_base_url(key, url)),
            (ProviderKind::OpenAi, None) => Box::new(OpenAIProvider::new(key)),
            (ProviderKind::OpenAiResponses, Some(url)) => {
                Box::new(ResponsesProvider::with_base_url(key, url))
            }
            (ProviderKind::OpenAiResponses, None) => Box::new(ResponsesProvider::new(key)),
            (ProviderKind::Anthropic, Some(url)) => {
                Box::new(AnthropicProvider::with_base_url(key, url))
            }
            (ProviderKind::Anthropic, None) => Box::new(AnthropicProvider::new(key)),
            (ProviderKind::Google, Some(url)) => Box::new(GoogleProvider::with_base_url(key, url)),
            (ProviderKind::Google, None) => Box::new(GoogleProvider::new(key)),
            (ProviderKind::Gwdg, Some(url)) => Box::new(GwdgProvider::with_base_url(key, url)),
            (ProviderKind::Gwdg, None) => Box::new(GwdgProvider::new(key)),
        }
    }

    pub fn from_env() -> Result<Box<dyn Provider>, Error> {
        let config = ProviderConfig::from_env()?;
        Ok(Self::create(&config))
    }
}
