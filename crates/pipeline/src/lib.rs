//! The chat-completion pipeline.
//!
//! Every `POST /v1/chat/completions` runs the same sequence:
//!
//! 1. **Authenticate** the bearer token (cached for a few minutes)
//! 2. **Compose** a system message from tool guidance if the client sent none
//! 3. **Resolve tools**: answer pending tool calls locally and on capability servers
//! 4. **Window** the history to the token budget and prune dangling tool calls
//! 5. **Forward** to the upstream and **relay** its answer, with the
//!    synthesized tool results surfaced to the client
//!
//! Tool and capability-server failures never abort a request; upstream
//! failures do, and are never retried.

pub mod auth_cache;
pub mod context;
pub mod frame;
pub mod orchestrator;

pub use auth_cache::AuthCache;
pub use context::{estimate_message_tokens, prune_trailing_tool_calls, window};
pub use frame::ToolResultsFrame;
pub use orchestrator::{
    CompletionOutput, CompletionPipeline, PipelineError, PipelineSettings, Prepared, Stage,
};
