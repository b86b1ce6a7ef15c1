//! History windowing and tool-call pruning.

use std::collections::HashSet;

use chatgate_core::message::{ChatMessage, answered_call_ids};
use tracing::debug;

use super::token::estimate_message_tokens;

/// Keep the newest messages that fit `budget`, plus every system message.
///
/// System and developer messages are charged first and always kept. The
/// rest are taken newest first until one would overflow the budget; that
/// message and everything older is dropped. Order is preserved.
pub fn window(messages: Vec<ChatMessage>, budget: usize) -> Vec<ChatMessage> {
    let mut used: usize = messages
        .iter()
        .filter(|m| m.is_system())
        .map(estimate_message_tokens)
        .sum();

    let mut keep = vec![false; messages.len()];
    let mut overflowed = false;

    for (idx, message) in messages.iter().enumerate().rev() {
        if message.is_system() {
            keep[idx] = true;
            continue;
        }
        if overflowed {
            continue;
        }
        let cost = estimate_message_tokens(message);
        if used + cost > budget {
            overflowed = true;
            continue;
        }
        used += cost;
        keep[idx] = true;
    }

    let total = messages.len();
    let kept: Vec<ChatMessage> = messages
        .into_iter()
        .zip(keep)
        .filter_map(|(m, k)| k.then_some(m))
        .collect();

    if kept.len() < total {
        debug!(dropped = total - kept.len(), kept = kept.len(), tokens = used, budget, "History windowed");
    }
    kept
}

/// Remove every assistant tool call that no tool message answers.
///
/// An assistant left with no calls has its `tool_calls` cleared to `None`.
/// Running this twice is the same as running it once.
pub fn prune_trailing_tool_calls(messages: &mut [ChatMessage]) {
    let answered: HashSet<String> = answered_call_ids(messages)
        .into_iter()
        .map(String::from)
        .collect();

    for message in messages.iter_mut() {
        let ChatMessage::Assistant(assistant) = message else {
            continue;
        };
        let Some(calls) = assistant.tool_calls.as_mut() else {
            continue;
        };
        let before = calls.len();
        calls.retain(|call| answered.contains(&call.id));
        if calls.len() < before {
            debug!(removed = before - calls.len(), "Pruned unanswered tool calls");
        }
        if calls.is_empty() {
            assistant.tool_calls = None;
        }
    }
}

/// Drop tool messages whose call is no longer in the conversation.
///
/// Windowing can cut an assistant message while keeping the tool results
/// that answered it.
pub fn drop_orphan_tool_results(messages: &mut Vec<ChatMessage>) {
    let issued: HashSet<String> = messages
        .iter()
        .flat_map(ChatMessage::tool_calls)
        .map(|call| call.id.clone())
        .collect();

    messages.retain(|m| match m.tool_call_id() {
        Some(id) => issued.contains(id),
        None => true,
    });
}
