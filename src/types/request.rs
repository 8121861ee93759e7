use serde::{Deserialize, Serialize};

use super::message::{AttachmentRef, Message};

/// One normalized request to an LLM backend.
///
/// Immutable once constructed: tool follow-ups build a new `Request`
/// rather than mutating the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub model: String,
    pub messages: Vec<Message>,
    /// Ask the provider for an incrementally streamed response.
    #[serde(default)]
    pub stream: bool,
    /// Suppress tool offers even when the model supports them. Set on
    /// follow-up requests to force a natural-language answer.
    #[serde(default)]
    pub disable_tools: bool,
}

impl Request {
    /// Create an empty request for a model.
    pub fn new(model: impl Into<String>) -> Self {
        Request {
            model: model.into(),
            messages: Vec::new(),
            stream: false,
            disable_tools: false,
        }
    }

    /// Append a system message.
    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::system(content));
        self
    }

    /// Append a user message.
    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    /// Append an assistant message.
    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::assistant(content));
        self
    }

    /// Append an arbitrary message.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Append a user message carrying an attachment.
    pub fn user_with_attachment(
        mut self,
        content: impl Into<String>,
        attachment: AttachmentRef,
    ) -> Self {
        self.messages
            .push(Message::user(content).with_attachment(attachment));
        self
    }

    /// Request a streamed response.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Suppress tool offers for this request.
    pub fn without_tools(mut self) -> Self {
        self.disable_tools = true;
        self
    }

    /// The last user message, if any.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::message::Role::User)
    }
}
