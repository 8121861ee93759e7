//! Accumulation of streamed fragments into finished values.
//!
//! Providers stream tool calls as indexed fragments (a name here, a slice
//! of the arguments string there) and stream assistant output as a series
//! of deltas. [`ToolCallAccumulator`] merges the former into complete
//! [`ToolCall`]s; [`ResponseAccumulator`] folds the latter into one final
//! [`Response`].

use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::{Response, ToolCall, ToolCallFragment};

/// Merges indexed tool-call fragments streamed across many chunks.
///
/// Fragments sharing an index belong to one call; their `name` and
/// `arguments` pieces are concatenated in arrival order. Call
/// [`finalize`] once the provider signals that tool calls are complete.
///
/// [`finalize`]: ToolCallAccumulator::finalize
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    partial: BTreeMap<u32, PartialCall>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the call at its index.
    pub fn ingest(&mut self, fragment: &ToolCallFragment) {
        let call = self.partial.entry(fragment.index).or_default();
        if call.id.is_none() {
            call.id = fragment.id.clone();
        }
        if let Some(name) = &fragment.name {
            call.name.push_str(name);
        }
        if let Some(arguments) = &fragment.arguments {
            call.arguments.push_str(arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }

    /// Decode every accumulated call, ordered by index, and reset.
    ///
    /// A call whose argument string does not decode as JSON is dropped
    /// with a warning; the remaining calls are still returned. A call
    /// that never received arguments gets an empty object.
    pub fn finalize(&mut self) -> Vec<ToolCall> {
        let partial = std::mem::take(&mut self.partial);
        let mut calls = Vec::new();

        for (index, call) in partial {
            let arguments = if call.arguments.trim().is_empty() {
                Value::Object(serde_json::Map::new())
            } else {
                match serde_json::from_str(&call.arguments) {
                    Ok(arguments) => arguments,
                    Err(err) => {
                        tracing::warn!(
                            tool = %call.name,
                            error = %err,
                            "dropping tool call with undecodable arguments"
                        );
                        continue;
                    }
                }
            };

            let id = call.id.unwrap_or_else(|| format!("tool-{index}"));
            calls.push(ToolCall::function(id, call.name, arguments, index));
        }

        calls
    }
}

/// Folds a sequence of streamed deltas into one complete [`Response`].
///
/// Content concatenates in arrival order; usage, finish reason, tool
/// calls, and grounding come from whichever delta carries them (each
/// appears at most once per stream).
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    content: String,
    tool_calls: Vec<ToolCall>,
    response: Response,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one streamed delta into the accumulation.
    pub fn push(&mut self, delta: &Response) {
        self.content.push_str(&delta.content);
        if let Some(calls) = &delta.tool_calls {
            self.tool_calls.extend(calls.iter().cloned());
        }
        if delta.finish_reason.is_some() {
            self.response.finish_reason = delta.finish_reason;
        }
        if let Some(usage) = &delta.usage {
            self.response.usage = Some(usage.clone());
        }
        if let Some(grounding) = &delta.grounding {
            self.response.grounding = Some(grounding.clone());
        }
        if let Some(error) = &delta.error {
            self.response.error = Some(error.clone());
        }
    }

    /// Finalize and return the complete response.
    pub fn into_response(self) -> Response {
        let mut response = self.response;
        response.content = self.content;
        response.tool_calls = if self.tool_calls.is_empty() {
            None
        } else {
            Some(self.tool_calls)
        };
        response.is_done = true;
        response
    }

    /// Concatenated text received so far.
    pub fn current_content(&self) -> &str {
        &self.content
    }
}
