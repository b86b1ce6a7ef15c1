//! # chatgate core
//!
//! Protocol types, traits, and error definitions for the chatgate
//! completion gateway. This crate has **no HTTP or storage dependencies**;
//! it defines the domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the pipeline talks to is a trait here:
//! - [`IdentityProvider`] validates bearer tokens
//! - [`Upstream`] forwards completions to the LLM service
//! - [`CapabilityStore`] persists per-user capability servers
//! - [`Tool`] is a locally executed function the model may call
//!
//! Implementations live in their respective crates, which keeps the
//! pipeline testable with in-process mocks.

pub mod capability;
pub mod error;
pub mod identity;
pub mod message;
pub mod request;
pub mod tool;
pub mod upstream;

// Re-export key types at crate root for ergonomics
pub use capability::{CapabilityServer, CapabilityStore, ServerOwner};
pub use identity::{AuthItem, IdentityProvider};
pub use message::{ChatMessage, FunctionCall, MessageContent, ToolCall};
pub use request::ChatPost;
pub use tool::{Tool, ToolDefinition, ToolOutcome, ToolProps, ToolRegistry, UnknownToolPolicy};
pub use upstream::{ByteStream, Upstream, UpstreamReply, UpstreamStream};
