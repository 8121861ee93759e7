//! Tool-call execution and follow-up request construction.

use std::sync::Arc;

use super::ToolRegistry;
use crate::types::{Message, Request, Response, Role, ToolCall, ToolResult};

/// Runs the tool calls a response asked for and builds the follow-up
/// request that feeds their results back to the model.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Execute calls sequentially, in the order the model issued them.
    /// Every call produces a result; failures come back as failed
    /// results rather than errors.
    pub async fn execute_calls(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let result = self
                .registry
                .execute(&call.name, &call.arguments, &call.id)
                .await;

            if result.success {
                tracing::info!(tool = %call.name, tool_call_id = %call.id, "tool executed");
            } else {
                tracing::error!(
                    tool = %call.name,
                    tool_call_id = %call.id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "tool execution failed"
                );
            }

            results.push(result);
        }

        results
    }

    /// Whether a response needs a tool round before the turn can end.
    pub fn requires_execution(response: &Response) -> bool {
        response.has_tool_calls() && response.is_done
    }

    /// Extend the original request with one assistant message carrying
    /// the tool calls, then one tool-role message per result.
    pub fn build_follow_up(
        request: &Request,
        response: &Response,
        results: &[ToolResult],
        disable_tools: bool,
    ) -> Request {
        let mut follow_up = request.clone();
        let calls = response.tool_calls.clone().unwrap_or_default();

        let mut assistant = if response.content.is_empty() {
            Message {
                role: Role::Assistant,
                content: Vec::new(),
                tool_calls: None,
                tool_call_id: None,
            }
        } else {
            Message::assistant(&response.content)
        };
        assistant.tool_calls = Some(calls);
        follow_up.messages.push(assistant);

        for result in results {
            follow_up
                .messages
                .push(Message::tool(&result.tool_call_id, result.content()));
        }

        if disable_tools {
            follow_up.disable_tools = true;
        }

        follow_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use crate::types::{FinishReason, ToolDefinition};
    use crate::Error;
    use serde_json::{json, Value};

    struct AdderTool;

    #[async_trait::async_trait]
    impl Tool for AdderTool {
        fn name(&self) -> &str {
            "add"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("add", "Add two numbers", json!({"type": "object"}))
        }

        async fn execute(&self, arguments: &Value, _tool_call_id: &str) -> Result<Value, Error> {
            let a = arguments.get("a").and_then(Value::as_i64).unwrap_or(0);
            let b = arguments.get("b").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!({"sum": a + b}))
        }
    }

    fn executor_with_adder() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(AdderTool));
        ToolExecutor::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_executes_calls_in_issued_order() {
        let executor = executor_with_adder();
        let calls = vec![
            ToolCall::function("call_1", "add", json!({"a": 1, "b": 2}), 0),
            ToolCall::function("call_2", "missing", json!({}), 1),
        ];

        let results = executor.execute_calls(&calls).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert_eq!(results[0].result, json!({"sum": 3}));
        assert!(!results[1].success);
        assert_eq!(results[1].tool_call_id, "call_2");
    }

    #[tokio::test]
    async fn test_follow_up_appends_assistant_and_tool_messages() {
        let executor = executor_with_adder();
        let request = Request::new("gpt-4o").user("What is 1+2?");
        let calls = vec![ToolCall::function("call_1", "add", json!({"a": 1, "b": 2}), 0)];
        let response =
            Response::done(Some(FinishReason::ToolCalls), None).with_tool_calls(calls.clone());

        let results = executor.execute_calls(&calls).await;
        let follow_up = ToolExecutor::build_follow_up(&request, &response, &results, false);

        assert_eq!(follow_up.messages.len(), 3);

        let assistant = &follow_up.messages[1];
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.tool_calls.as_ref().unwrap().len(), 1);
        assert!(assistant.content.is_empty());

        let tool_message = &follow_up.messages[2];
        assert_eq!(tool_message.role, Role::Tool);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_message.text_content(), "{\"sum\":3}");

        assert!(!follow_up.disable_tools);
    }

    #[tokio::test]
    async fn test_follow_up_keeps_partial_assistant_text() {
        let executor = executor_with_adder();
        let request = Request::new("gpt-4o").user("add");
        let calls = vec![ToolCall::function("call_1", "add", json!({"a": 2, "b": 2}), 0)];
        let mut response = Response::done(Some(FinishReason::ToolCalls), None)
            .with_tool_calls(calls.clone());
        response.content = "Let me calculate that.".to_string();

        let results = executor.execute_calls(&calls).await;
        let follow_up = ToolExecutor::build_follow_up(&request, &response, &results, true);

        let assistant = &follow_up.messages[1];
        assert_eq!(assistant.text_content(), "Let me calculate that.");
        assert!(assistant.tool_calls.is_some());
        assert!(follow_up.disable_tools);
    }

    #[test]
    fn test_requires_execution_needs_done_and_calls() {
        let with_calls = Response::done(Some(FinishReason::ToolCalls), None)
            .with_tool_calls(vec![ToolCall::function("c", "add", json!({}), 0)]);
        assert!(ToolExecutor::requires_execution(&with_calls));

        let done_without_calls = Response::done(Some(FinishReason::Stop), None);
        assert!(!ToolExecutor::requires_execution(&done_without_calls));

        let mut undone = with_calls.clone();
        undone.is_done = false;
        assert!(!ToolExecutor::requires_execution(&undone));
    }
}
