//! The chat-completions request envelope.
//!
//! `ChatPost` names the fields the gateway reads or validates and keeps every
//! other field verbatim, so the upstream receives exactly what the client
//! sent apart from the rewritten message list.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::message::ChatMessage;

/// An OpenAI-compatible `POST /v1/chat/completions` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPost {
    /// The model to use
    pub model: String,

    /// The conversation, replaced in place by the pipeline before forwarding
    pub messages: Vec<ChatMessage>,

    /// Whether to stream the response as server-sent events; `null` reads as false
    #[serde(default, deserialize_with = "null_as_false")]
    pub stream: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<i64>,

    /// Tool definitions the client advertises to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,

    /// Tool-choice policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Everything else (stop, seed, response_format, metadata, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `"none" | "auto" | "required"` or a named function object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(String),
    Named(serde_json::Value),
}

impl ChatPost {
    /// Create a minimal request for `model` with `messages`.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            temperature: None,
            top_p: None,
            n: None,
            presence_penalty: None,
            frequency_penalty: None,
            max_tokens: None,
            max_completion_tokens: None,
            tools: None,
            tool_choice: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Check sampling parameters against the ranges the API accepts.
    pub fn validate(&self) -> Result<(), RequestError> {
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        check_min("n", self.n, 1)?;
        check_min("max_tokens", self.max_tokens, 1)?;
        check_min("max_completion_tokens", self.max_completion_tokens, 1)?;
        Ok(())
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn check_range(field: &'static str, value: Option<f64>, min: f64, max: f64) -> Result<(), RequestError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(RequestError::OutOfRange {
            field,
            value: v,
            min,
            max,
        }),
        _ => Ok(()),
    }
}

fn check_min(field: &'static str, value: Option<i64>, min: i64) -> Result<(), RequestError> {
    match value {
        Some(v) if v < min => Err(RequestError::TooSmall { field, value: v, min }),
        _ => Ok(()),
    }
}
