//! Chat message domain types.
//!
//! Messages use the OpenAI chat-completions wire shape. Each role is its own
//! variant, so a tool result cannot exist without the `tool_call_id` it
//! answers and only assistants carry tool calls.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Message content: plain text or a sequence of typed content items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A single typed content item (`{"type": "text", "text": "..."}`,
/// `{"type": "image_url", ...}`). Fields other than `type` are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ContentPart {
    /// Create a `text` content item.
    pub fn text(text: impl Into<String>) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("text".into(), serde_json::Value::String(text.into()));
        Self {
            kind: "text".into(),
            fields,
        }
    }
}

impl MessageContent {
    /// The content as plain text, if it is plain text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Parts(_) => None,
        }
    }

    /// Length in characters of the rendered content.
    ///
    /// Text counts its own characters; structured content counts the
    /// characters of its JSON serialization.
    pub fn char_len(&self) -> usize {
        match self {
            Self::Text(text) => text.chars().count(),
            Self::Parts(parts) => serde_json::to_string(parts)
                .map(|s| s.chars().count())
                .unwrap_or(0),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Function name and raw arguments of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,

    /// Arguments as the model produced them. Not guaranteed to be valid JSON.
    pub arguments: String,
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this call within the turn
    pub id: String,

    #[serde(default = "function_kind")]
    pub r#type: String,

    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".into()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            r#type: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// System (or developer) instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub content: MessageContent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: MessageContent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// `null` when the assistant only requested tool calls
    #[serde(default)]
    pub content: Option<MessageContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<serde_json::Value>,

    /// Ordered tool calls. `None` rather than empty once every call is pruned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// The result of a tool call, linked back to it by `tool_call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub content: MessageContent,
    pub tool_call_id: String,
}

/// A single message in a conversation, discriminated by `role`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System(SystemMessage),
    Developer(SystemMessage),
    User(UserMessage),
    Assistant(AssistantMessage),
    Tool(ToolMessage),
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::System(SystemMessage {
            content: content.into(),
            name: None,
        })
    }

    /// Create a user message.
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::User(UserMessage {
            content: content.into(),
            name: None,
        })
    }

    /// Create an assistant text message.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::Assistant(AssistantMessage {
            content: Some(content.into()),
            refusal: None,
            name: None,
            audio: None,
            tool_calls: None,
        })
    }

    /// Create an assistant message that only requests tool calls.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::Assistant(AssistantMessage {
            content: None,
            refusal: None,
            name: None,
            audio: None,
            tool_calls: Some(calls),
        })
    }

    /// Create a tool result answering `call`.
    pub fn tool_result(call: &ToolCall, content: impl Into<MessageContent>) -> Self {
        Self::Tool(ToolMessage {
            content: content.into(),
            tool_call_id: call.id.clone(),
        })
    }

    /// The wire role name.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System(_) => "system",
            Self::Developer(_) => "developer",
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::Tool(_) => "tool",
        }
    }

    /// System and developer messages are both instructions.
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System(_) | Self::Developer(_))
    }

    pub fn content(&self) -> Option<&MessageContent> {
        match self {
            Self::System(m) | Self::Developer(m) => Some(&m.content),
            Self::User(m) => Some(&m.content),
            Self::Assistant(m) => m.content.as_ref(),
            Self::Tool(m) => Some(&m.content),
        }
    }

    /// Tool calls requested by an assistant message; empty for other roles.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant(m) => m.tool_calls.as_deref().unwrap_or_default(),
            _ => &[],
        }
    }

    /// The call this message answers, for tool messages.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::Tool(m) => Some(&m.tool_call_id),
            _ => None,
        }
    }
}

/// IDs of every tool call answered by a tool message in `messages`.
pub fn answered_call_ids(messages: &[ChatMessage]) -> HashSet<&str> {
    messages.iter().filter_map(ChatMessage::tool_call_id).collect()
}

/// Tool calls in `messages`, in order, whose id is not in `answered`.
pub fn unanswered_calls<'a>(
    messages: &'a [ChatMessage],
    answered: &HashSet<&str>,
) -> Vec<&'a ToolCall> {
    messages
        .iter()
        .flat_map(ChatMessage::tool_calls)
        .filter(|call| !answered.contains(call.id.as_str()))
        .collect()
}

/// Messages strictly after the last user message: the current turn.
///
/// With no user message at all, the whole conversation is the turn.
pub fn current_turn(messages: &[ChatMessage]) -> &[ChatMessage] {
    let start = messages
        .iter()
        .rposition(|m| matches!(m, ChatMessage::User(_)))
        .map(|idx| idx + 1)
        .unwrap_or(0);
    &messages[start..]
}

/// Unanswered tool calls of the current turn, checked against answers
/// anywhere in the conversation.
pub fn pending_tool_calls(messages: &[ChatMessage]) -> Vec<&ToolCall> {
    let answered = answered_call_ids(messages);
    unanswered_calls(current_turn(messages), &answered)
}
