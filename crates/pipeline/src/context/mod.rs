//! Context-window management.
//!
//! The forwarded conversation must fit an approximate token budget and must
//! never reference a tool call that has no answer.

pub mod token;
pub mod window;

pub use token::{estimate_message_tokens, estimate_messages_tokens};
pub use window::{drop_orphan_tool_results, prune_trailing_tool_calls, window};
