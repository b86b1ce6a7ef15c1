//! The completion orchestrator.
//!
//! Drives one request through `Authenticating → ComposingSystemPrompt →
//! ResolvingTools → Windowing → Forwarding → Relaying → Done`. Steps run
//! strictly in order; only the capability fan-out inside a step runs
//! concurrently.

use std::sync::Arc;

use bytes::Bytes;
use chatgate_capabilities::{CapabilityClient, ServerDirectory};
use chatgate_config::AppConfig;
use chatgate_core::error::{ToolError, UpstreamError};
use chatgate_core::message::pending_tool_calls;
use chatgate_core::{
    AuthItem, ByteStream, CapabilityServer, ChatMessage, ChatPost, ToolDefinition, ToolRegistry,
    UnknownToolPolicy, Upstream,
};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::auth_cache::AuthCache;
use crate::context::{drop_orphan_tool_results, prune_trailing_tool_calls, window};
use crate::frame::ToolResultsFrame;

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticating,
    ComposingSystemPrompt,
    ResolvingTools,
    Windowing,
    Forwarding,
    Relaying,
    Done,
    Failed,
}

/// Why a request did not reach the upstream, or failed talking to it.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid authentication")]
    Unauthenticated,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Upstream failure: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Knobs taken from `AppConfig`.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub token_budget: usize,
    pub system_prompt: Option<String>,
    pub unknown_tool_policy: UnknownToolPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            token_budget: config.context.token_budget,
            system_prompt: config.context.system_prompt.clone(),
            unknown_tool_policy: config.tools.unknown_tool_policy,
        }
    }
}

/// A request ready to forward.
#[derive(Debug)]
pub struct Prepared {
    /// The request with its final message list
    pub post: ChatPost,
    /// Tool results synthesized for this request, local first
    pub tool_res_messages: Vec<ChatMessage>,
}

/// What goes back to the client.
pub enum CompletionOutput {
    /// Upstream JSON with `tool_res_messages` merged in
    Buffered { body: serde_json::Value },
    /// SSE bytes: the tool-results frame (if any) then the upstream stream
    Stream { content_type: String, body: ByteStream },
    /// A non-2xx upstream answer, returned as-is
    Passthrough {
        status: u16,
        content_type: Option<String>,
        body: Bytes,
    },
}

impl std::fmt::Debug for CompletionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered { body } => f.debug_struct("Buffered").field("body", body).finish(),
            Self::Stream { content_type, .. } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .finish_non_exhaustive(),
            Self::Passthrough { status, content_type, body } => f
                .debug_struct("Passthrough")
                .field("status", status)
                .field("content_type", content_type)
                .field("len", &body.len())
                .finish(),
        }
    }
}

/// Everything a completion request needs, shared across requests.
pub struct CompletionPipeline {
    auth: AuthCache,
    tools: Arc<ToolRegistry>,
    directory: ServerDirectory,
    capabilities: CapabilityClient,
    upstream: Arc<dyn Upstream>,
    settings: PipelineSettings,
}

fn enter(stage: Stage) {
    debug!(stage = ?stage, "Pipeline stage");
}

impl CompletionPipeline {
    pub fn new(
        auth: AuthCache,
        tools: Arc<ToolRegistry>,
        directory: ServerDirectory,
        capabilities: CapabilityClient,
        upstream: Arc<dyn Upstream>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            auth,
            tools,
            directory,
            capabilities,
            upstream,
            settings,
        }
    }

    pub fn directory(&self) -> &ServerDirectory {
        &self.directory
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Resolve the caller, or fail with `Unauthenticated`.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthItem, PipelineError> {
        enter(Stage::Authenticating);
        match self.auth.resolve(authorization).await {
            Some(user) => Ok(user),
            None => {
                enter(Stage::Failed);
                Err(PipelineError::Unauthenticated)
            }
        }
    }

    /// Local tool definitions followed by every active server's.
    pub async fn available_tools(&self, user: &AuthItem) -> Vec<ToolDefinition> {
        let servers = self.directory.active_for(user.user_id).await;
        let mut tools = self.tools.definitions();
        tools.extend(self.capabilities.list_tools(&servers).await);
        tools
    }

    /// Validate, prepare and forward one request for an authenticated user.
    pub async fn complete(
        &self,
        user: &AuthItem,
        authorization: Option<&str>,
        post: ChatPost,
    ) -> Result<CompletionOutput, PipelineError> {
        post.validate()
            .map_err(|e| PipelineError::InvalidRequest(e.to_string()))?;

        let prepared = self.prepare(user, post).await;
        self.forward(prepared, authorization).await
    }

    /// Steps 2 to 4: system prompt, tool resolution, windowing.
    ///
    /// Never fails; tool and capability-server problems are logged and
    /// show up as error tool messages or missing results.
    pub async fn prepare(&self, user: &AuthItem, mut post: ChatPost) -> Prepared {
        // Read once per request; the store connection is released before any fan-out.
        let servers = self.directory.active_for(user.user_id).await;

        enter(Stage::ComposingSystemPrompt);
        let mut messages = std::mem::take(&mut post.messages);
        if !messages.first().is_some_and(ChatMessage::is_system) {
            if let Some(system) = self.compose_system_prompt(&servers).await {
                messages.insert(0, system);
            }
        }

        enter(Stage::ResolvingTools);
        let tool_res_messages = self.resolve_tools(&servers, user.user_id, &messages).await;
        messages.extend(tool_res_messages.iter().cloned());

        enter(Stage::Windowing);
        let mut messages = window(messages, self.settings.token_budget);
        prune_trailing_tool_calls(&mut messages);
        drop_orphan_tool_results(&mut messages);

        post.messages = messages;
        Prepared {
            post,
            tool_res_messages,
        }
    }

    async fn compose_system_prompt(&self, servers: &[CapabilityServer]) -> Option<ChatMessage> {
        let remote = self.capabilities.list_tool_props(servers).await;

        let fragments: Vec<String> = self
            .settings
            .system_prompt
            .iter()
            .cloned()
            .chain(self.tools.props().into_iter().filter_map(|p| p.system_prompt))
            .chain(remote.into_iter().filter_map(|p| p.system_prompt))
            .filter(|f| !f.trim().is_empty())
            .collect();

        if fragments.is_empty() {
            return None;
        }
        debug!(fragments = fragments.len(), "System prompt composed");
        Some(ChatMessage::system(fragments.join("\n\n")))
    }

    /// Local results, then remote results, then (in report mode) errors for
    /// calls nobody answered.
    async fn resolve_tools(
        &self,
        servers: &[CapabilityServer],
        user_id: i64,
        messages: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        if pending_tool_calls(messages).is_empty() {
            return Vec::new();
        }

        // Calls no local tool owns may belong to a capability server, so
        // unknown names are only reported once both sides have answered.
        let (mut results, remote) = tokio::join!(
            self.tools.resolve_pending(messages),
            self.capabilities.execute_tools(servers, user_id, messages),
        );
        results.extend(remote);

        if self.settings.unknown_tool_policy == UnknownToolPolicy::Report {
            let mut conversation = messages.to_vec();
            conversation.extend(results.iter().cloned());
            let unknown: Vec<ChatMessage> = pending_tool_calls(&conversation)
                .into_iter()
                .filter(|call| self.tools.get(&call.function.name).is_none())
                .map(|call| {
                    let err = ToolError::UnknownTool(call.function.name.clone());
                    warn!(tool = %call.function.name, call_id = %call.id, "No local tool or capability server answered call");
                    ChatMessage::tool_result(call, format!("Error: {err}"))
                })
                .collect();
            results.extend(unknown);
        }

        info!(user_id, results = results.len(), "Tool calls resolved");
        results
    }

    /// Steps 5 and 6: send upstream and shape the reply.
    pub async fn forward(
        &self,
        prepared: Prepared,
        authorization: Option<&str>,
    ) -> Result<CompletionOutput, PipelineError> {
        let Prepared { post, tool_res_messages } = prepared;

        enter(Stage::Forwarding);
        if post.stream {
            self.relay_stream(&post, tool_res_messages, authorization).await
        } else {
            self.relay_buffered(&post, tool_res_messages, authorization).await
        }
    }

    async fn relay_stream(
        &self,
        post: &ChatPost,
        tool_res_messages: Vec<ChatMessage>,
        authorization: Option<&str>,
    ) -> Result<CompletionOutput, PipelineError> {
        let upstream = self.upstream.stream(post, authorization).await.map_err(|e| {
            enter(Stage::Failed);
            warn!(upstream = self.upstream.name(), error = %e, "Upstream unreachable");
            e
        })?;

        if !upstream.is_success() {
            let status = upstream.status;
            let content_type = upstream.content_type;
            let chunks: Vec<Bytes> = upstream.body.try_collect().await?;
            enter(Stage::Done);
            return Ok(CompletionOutput::Passthrough {
                status,
                content_type,
                body: Bytes::from(chunks.concat()),
            });
        }

        enter(Stage::Relaying);
        let content_type = upstream
            .content_type
            .unwrap_or_else(|| "text/event-stream".to_string());

        let body: ByteStream = if tool_res_messages.is_empty() {
            upstream.body
        } else {
            let frame = ToolResultsFrame::new(&post.model, &tool_res_messages)
                .to_sse()
                .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
            Box::pin(futures::stream::once(async move { Ok(frame) }).chain(upstream.body))
        };

        Ok(CompletionOutput::Stream { content_type, body })
    }

    async fn relay_buffered(
        &self,
        post: &ChatPost,
        tool_res_messages: Vec<ChatMessage>,
        authorization: Option<&str>,
    ) -> Result<CompletionOutput, PipelineError> {
        let reply = self.upstream.complete(post, authorization).await.map_err(|e| {
            enter(Stage::Failed);
            warn!(upstream = self.upstream.name(), error = %e, "Upstream unreachable");
            e
        })?;

        enter(Stage::Relaying);
        if !reply.is_success() {
            enter(Stage::Done);
            return Ok(CompletionOutput::Passthrough {
                status: reply.status,
                content_type: reply.content_type,
                body: reply.body,
            });
        }

        let mut body = reply.json()?;
        let Some(object) = body.as_object_mut() else {
            enter(Stage::Failed);
            return Err(UpstreamError::InvalidResponse("response is not a JSON object".into()).into());
        };
        object.insert(
            "tool_res_messages".into(),
            serde_json::to_value(&tool_res_messages)
                .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?,
        );

        enter(Stage::Done);
        Ok(CompletionOutput::Buffered { body })
    }
}
