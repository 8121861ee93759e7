use serde::{Deserialize, Serialize};

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// Tool calls the assistant requested in this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<super::tool::ToolCall>>,
    /// For tool-role messages, the id of the call this message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// One piece of message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Attachment { attachment: AttachmentRef },
}

/// Reference to an attachment stored outside this layer.
///
/// The bytes are resolved through an [`AttachmentStore`](crate::transport::AttachmentStore)
/// when a request converter inlines them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub name: String,
    pub kind: AttachmentKind,
    pub mime_type: String,
}

/// Attachment kind, used to branch on model capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Document,
}

impl Message {
    /// Create a message with a single text part.
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: vec![ContentPart::Text {
                text: content.into(),
            }],
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::text(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message::text(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::text(Role::Assistant, content)
    }

    /// Create a tool-role message answering one tool call.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            role: Role::Tool,
            content: vec![ContentPart::Text {
                text: content.into(),
            }],
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Attach a reference to this message.
    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.content.push(ContentPart::Attachment { attachment });
        self
    }

    /// Attach the assistant's tool calls to this message.
    pub fn with_tool_calls(mut self, calls: Vec<super::tool::ToolCall>) -> Self {
        self.tool_calls = Some(calls);
        self
    }

    /// Concatenated text content of this message.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for part in &self.content {
            if let ContentPart::Text { text } = part {
                out.push_str(text);
            }
        }
        out
    }

    /// Attachment references carried by this message.
    pub fn attachments(&self) -> impl Iterator<Item = &AttachmentRef> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::Attachment { attachment } => Some(attachment),
            ContentPart::Text { .. } => None,
        })
    }

    /// Whether this message carries any non-text content.
    pub fn has_attachments(&self) -> bool {
        self.attachments().next().is_some()
    }
}

impl AttachmentRef {
    pub fn image(id: impl Into<String>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        AttachmentRef {
            id: id.into(),
            name: name.into(),
            kind: AttachmentKind::Image,
            mime_type: mime_type.into(),
        }
    }

    pub fn document(id: impl Into<String>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        AttachmentRef {
            id: id.into(),
            name: name.into(),
            kind: AttachmentKind::Document,
            mime_type: mime_type.into(),
        }
    }
}
