//! The synthetic frame that surfaces tool results to streaming clients.
//!
//! Shaped like a chat-completion chunk so SSE parsers accept it, but with
//! `object: "tool_res_messages"` and no choices.

use bytes::Bytes;
use chatgate_core::ChatMessage;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ToolResultsFrame<'a> {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: &'a str,
    pub choices: [(); 0],
    pub tool_res_messages: &'a [ChatMessage],
}

impl<'a> ToolResultsFrame<'a> {
    pub fn new(model: &'a str, tool_res_messages: &'a [ChatMessage]) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            object: "tool_res_messages",
            created: chrono::Utc::now().timestamp(),
            model,
            choices: [],
            tool_res_messages,
        }
    }

    /// Render as one SSE `data:` event.
    pub fn to_sse(&self) -> Result<Bytes, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(Bytes::from(format!("data: {json}\n\n")))
    }
}
