//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded down,
//! never below one character's worth of input.

use chatgate_core::message::ChatMessage;

/// Estimate the token cost of a message from its content alone.
///
/// `max(1, chars) / 4`. Structured content counts its JSON serialization;
/// absent content counts as the literal `null`.
pub fn estimate_message_tokens(message: &ChatMessage) -> usize {
    let chars = message.content().map(|c| c.char_len()).unwrap_or(NULL_CONTENT.len());
    chars.max(1) / 4
}

const NULL_CONTENT: &str = "null";

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
