//! Stateful stream translation for the chat completions dialect.

use crate::accumulator::ToolCallAccumulator;
use crate::provider::ChunkTranslator;
use crate::types::{FinishReason, Response, ToolCall, ToolCallFragment, Usage};

use super::types::ChatCompletion;

/// Translates chat completions stream chunks into response deltas.
///
/// The wire sends `finish_reason` before the final usage-only chunk
/// (`choices` empty, `usage` set), so the finish state is stashed and
/// the terminal delta goes out when usage arrives or the stream ends.
/// Some upstreams (Mistral models behind GWDG) also put a `usage` field
/// on intermediate content chunks; those are ignored, usage is only
/// trusted on a chunk with no choices.
#[derive(Default)]
pub struct ChatChunkTranslator {
    accumulator: ToolCallAccumulator,
    pending_finish: Option<FinishReason>,
    pending_calls: Vec<ToolCall>,
    finished: bool,
}

impl ChatChunkTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    fn terminal(&mut self, usage: Option<Usage>) -> Response {
        self.finished = true;
        Response::done(self.pending_finish.take(), usage)
            .with_tool_calls(std::mem::take(&mut self.pending_calls))
    }
}

impl ChunkTranslator for ChatChunkTranslator {
    fn translate_chunk(&mut self, raw: &str) -> Response {
        if self.finished {
            return Response::empty();
        }

        let chunk: ChatCompletion = match serde_json::from_str(raw) {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unparseable chat stream chunk");
                return Response::empty();
            }
        };

        // Usage-only chunk: the stream's last word.
        if chunk.choices.is_empty() {
            if let Some(usage) = chunk.usage {
                return self.terminal(Some(usage.into()));
            }
            return Response::empty();
        }

        let choice = &chunk.choices[0];
        let mut delta = Response::empty();

        if let Some(d) = &choice.delta {
            if let Some(content) = &d.content {
                delta.content = content.clone();
            }
            if let Some(calls) = &d.tool_calls {
                for call in calls {
                    self.accumulator.ingest(&ToolCallFragment {
                        index: call.index,
                        id: call.id.clone(),
                        name: call.function.as_ref().and_then(|f| f.name.clone()),
                        arguments: call.function.as_ref().and_then(|f| f.arguments.clone()),
                    });
                }
            }
        }

        if let Some(reason) = &choice.finish_reason {
            self.pending_finish = FinishReason::from_wire(reason);
            if !self.accumulator.is_empty() {
                self.pending_calls = self.accumulator.finalize();
            }
        }

        delta
    }

    fn finish(&mut self) -> Option<Response> {
        if self.finished || self.pending_finish.is_none() {
            return None;
        }
        Some(self.terminal(None))
    }
}

/// Translate a complete (non-streamed) chat completions body.
pub(crate) fn translate_full_body(body: &str) -> Result<Response, crate::Error> {
    let completion: ChatCompletion = serde_json::from_str(body)?;

    let mut response = Response {
        is_done: true,
        usage: completion.usage.map(Into::into),
        ..Response::default()
    };

    let Some(choice) = completion.choices.first() else {
        return Ok(response);
    };
    response.finish_reason = choice
        .finish_reason
        .as_deref()
        .and_then(FinishReason::from_wire);

    if let Some(message) = &choice.message {
        if let Some(content) = &message.content {
            response.content = content.clone();
        }
        if let Some(calls) = &message.tool_calls {
            let mut converted = Vec::new();
            for (index, call) in calls.iter().enumerate() {
                let arguments = if call.function.arguments.trim().is_empty() {
                    serde_json::Value::Object(serde_json::Map::new())
                } else {
                    match serde_json::from_str(&call.function.arguments) {
                        Ok(arguments) => arguments,
                        Err(err) => {
                            tracing::warn!(
                                tool = %call.function.name,
                                error = %err,
                                "dropping tool call with undecodable arguments"
                            );
                            continue;
                        }
                    }
                };
                converted.push(ToolCall::function(
                    call.id.clone(),
                    call.function.name.clone(),
                    arguments,
                    index as u32,
                ));
            }
            response = response.with_tool_calls(converted);
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(value: serde_json::Value) -> String {
        value.to_string()
    }

    #[test]
    fn test_content_deltas_then_usage_chunk() {
        let mut translator = ChatChunkTranslator::new();

        let first = translator.translate_chunk(&chunk(json!({
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": "Hel"}}]
        })));
        assert_eq!(first.content, "Hel");
        assert!(!first.is_done);

        let second = translator.translate_chunk(&chunk(json!({
            "choices": [{"index": 0, "delta": {"content": "lo"}, "finish_reason": "stop"}]
        })));
        assert_eq!(second.content, "lo");
        assert!(!second.is_done);

        let terminal = translator.translate_chunk(&chunk(json!({
            "choices": [],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        })));
        assert!(terminal.is_done);
        assert_eq!(terminal.finish_reason, Some(FinishReason::Stop));
        assert_eq!(terminal.usage.as_ref().unwrap().input_tokens, 12);
        assert!(translator.finish().is_none());
    }

    #[test]
    fn test_stream_end_without_usage_chunk_flushes_terminal() {
        let mut translator = ChatChunkTranslator::new();
        translator.translate_chunk(&chunk(json!({
            "choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": "stop"}]
        })));

        let terminal = translator.finish().expect("terminal delta");
        assert!(terminal.is_done);
        assert_eq!(terminal.finish_reason, Some(FinishReason::Stop));
        assert!(terminal.usage.is_none());
        assert!(translator.finish().is_none());
    }

    #[test]
    fn test_tool_call_fragments_accumulate_across_chunks() {
        let mut translator = ChatChunkTranslator::new();

        for fragment in [
            json!({"index": 0, "id": "call_7", "function": {"name": "ro"}}),
            json!({"index": 0, "function": {"name": "ll", "arguments": "{\"d"}}),
            json!({"index": 0, "function": {"arguments": "ice\":1}"}}),
        ] {
            let delta = translator.translate_chunk(&chunk(json!({
                "choices": [{"index": 0, "delta": {"tool_calls": [fragment]}}]
            })));
            assert!(delta.is_empty());
        }

        translator.translate_chunk(&chunk(json!({
            "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]
        })));

        let terminal = translator.finish().expect("terminal delta");
        assert!(terminal.is_done);
        assert_eq!(terminal.finish_reason, Some(FinishReason::ToolCalls));
        let calls = terminal.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "roll");
        assert_eq!(calls[0].arguments, json!({"dice": 1}));
    }

    #[test]
    fn test_intermediate_usage_with_choices_is_ignored() {
        // Mistral behind GWDG reports usage alongside content.
        let mut translator = ChatChunkTranslator::new();
        let delta = translator.translate_chunk(&chunk(json!({
            "choices": [{"index": 0, "delta": {"content": "x"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1}
        })));
        assert_eq!(delta.content, "x");
        assert!(delta.usage.is_none());
        assert!(!delta.is_done);
    }

    #[test]
    fn test_unknown_shape_yields_empty_delta() {
        let mut translator = ChatChunkTranslator::new();
        assert!(translator.translate_chunk("{\"surprise\":true}").is_empty());
        assert!(translator.translate_chunk("not json").is_empty());
    }

    #[test]
    fn test_translate_full_with_tool_calls() {
        let body = json!({
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "roll", "arguments": "{\"dice\":2}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 8}
        })
        .to_string();

        let response = translate_full_body(&body).unwrap();
        assert!(response.is_done);
        assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
        let calls = response.tool_calls.unwrap();
        assert_eq!(calls[0].name, "roll");
        assert_eq!(calls[0].arguments, json!({"dice": 2}));
        assert_eq!(response.usage.unwrap().output_tokens, 8);
    }
}
