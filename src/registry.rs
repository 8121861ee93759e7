//! Model capability registry.
//!
//! Providers expose fleets of models with uneven capabilities: some take
//! images, some call functions natively, some reach tools only through an
//! MCP bridge. Capability records are pure data; converters and the tool
//! layer consult them instead of hard-coding per-model behavior.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::Error;

/// How a model executes a named tool.
///
/// Legacy records store plain booleans; `true` coerces to `Native` and
/// `false` to `Unsupported` on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStrategy {
    /// The provider runs the tool itself (built-in web search, vision).
    Native,
    /// Exposed to the model as a function-calling definition.
    FunctionCall,
    /// Bridged through an MCP server.
    Mcp,
    Unsupported,
}

impl<'de> Deserialize<'de> for ToolStrategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StrategyVisitor;

        impl Visitor<'_> for StrategyVisitor {
            type Value = ToolStrategy;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a boolean or a tool strategy string")
            }

            fn visit_bool<E>(self, value: bool) -> Result<ToolStrategy, E> {
                Ok(if value {
                    ToolStrategy::Native
                } else {
                    ToolStrategy::Unsupported
                })
            }

            fn visit_str<E>(self, value: &str) -> Result<ToolStrategy, E>
            where
                E: de::Error,
            {
                match value {
                    "native" => Ok(ToolStrategy::Native),
                    "function_call" => Ok(ToolStrategy::FunctionCall),
                    "mcp" => Ok(ToolStrategy::Mcp),
                    "unsupported" => Ok(ToolStrategy::Unsupported),
                    other => Err(E::unknown_variant(
                        other,
                        &["native", "function_call", "mcp", "unsupported"],
                    )),
                }
            }
        }

        deserializer.deserialize_any(StrategyVisitor)
    }
}

/// Capability record for one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Accepted input modalities, e.g. `text`, `image`.
    #[serde(default = "default_text_modality")]
    pub input: Vec<String>,
    #[serde(default = "default_text_modality")]
    pub output: Vec<String>,
    /// Tool name to execution strategy.
    #[serde(default)]
    pub tools: HashMap<String, ToolStrategy>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    /// Provider-native tool parameters forwarded verbatim into request
    /// payloads, e.g. `{"type": "web_search"}`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_tools: Vec<Value>,
}

fn default_true() -> bool {
    true
}

fn default_text_modality() -> Vec<String> {
    vec!["text".to_string()]
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            active: true,
            input: default_text_modality(),
            output: default_text_modality(),
            tools: HashMap::new(),
            metadata: HashMap::new(),
            provider_tools: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_input(mut self, modalities: &[&str]) -> Self {
        self.input = modalities.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>, strategy: ToolStrategy) -> Self {
        self.tools.insert(name.into(), strategy);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_provider_tool(mut self, tool: Value) -> Self {
        self.provider_tools.push(tool);
        self
    }

    /// Display label, falling back to the id.
    pub fn label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// Fuzzy id match: exact, or one id is a suffix of the other. Lets
    /// `claude-3-5-sonnet` match the dated `claude-3-5-sonnet-20241022`.
    pub fn matches(&self, id: &str) -> bool {
        if id.is_empty() || self.id.is_empty() {
            return false;
        }
        self.id == id || self.id.ends_with(id) || id.ends_with(&self.id)
    }

    /// Execution strategy for a tool, if one is configured.
    pub fn tool_strategy(&self, name: &str) -> Option<ToolStrategy> {
        self.tools.get(name).copied()
    }

    /// True when the tool is configured with any usable strategy.
    pub fn has_tool(&self, name: &str) -> bool {
        matches!(
            self.tool_strategy(name),
            Some(strategy) if strategy != ToolStrategy::Unsupported
        )
    }

    pub fn has_input(&self, modality: &str) -> bool {
        self.input.iter().any(|m| m == modality)
    }

    pub fn supports_streaming(&self) -> bool {
        self.has_tool("stream")
    }

    pub fn supports_function_calling(&self) -> bool {
        self.has_tool("function_calling")
    }

    /// MCP tools ride on function calling, so both capabilities are
    /// required.
    pub fn supports_mcp_tools(&self) -> bool {
        self.supports_function_calling() && self.has_tool("mcp")
    }

    pub fn can_process_image(&self) -> bool {
        self.has_input("image") && self.has_tool("vision")
    }

    pub fn can_process_document(&self) -> bool {
        self.has_tool("file_upload")
    }
}

/// Lookup table over the configured model fleet.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelInfo>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry from a JSON array of capability records.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let models: Vec<ModelInfo> = serde_json::from_str(json)?;
        Ok(Self { models })
    }

    pub fn register(&mut self, model: ModelInfo) {
        self.models.push(model);
    }

    /// Find a model by fuzzy id match, preferring an exact hit.
    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models
            .iter()
            .find(|m| m.id == id)
            .or_else(|| self.models.iter().find(|m| m.matches(id)))
    }

    /// Like [`get`], but a missing model is an error.
    ///
    /// [`get`]: ModelRegistry::get
    pub fn find(&self, id: &str) -> Result<&ModelInfo, Error> {
        self.get(id).ok_or_else(|| Error::ModelNotFound(id.to_string()))
    }

    /// Models currently available for use.
    pub fn active(&self) -> impl Iterator<Item = &ModelInfo> {
        self.models.iter().filter(|m| m.active)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }
}
