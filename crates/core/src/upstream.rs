//! Upstream trait — the OpenAI-compatible completions backend the gateway
//! forwards prepared requests to.
//!
//! The gateway never interprets the upstream's answer beyond its status: a
//! buffered body is decorated with tool results, a stream is relayed byte
//! for byte.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::UpstreamError;
use crate::request::ChatPost;

/// Raw response bytes as they arrive from the upstream.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, UpstreamError>> + Send>>;

/// A complete (non-streaming) upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> std::result::Result<serde_json::Value, UpstreamError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))
    }
}

/// A streaming upstream response: status and headers now, body later.
pub struct UpstreamStream {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl std::fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamStream")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl UpstreamStream {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The completions backend.
///
/// `authorization` is the caller's original header value, forwarded so the
/// upstream can meter the same key the gateway authenticated.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// A human-readable name for this upstream.
    fn name(&self) -> &str;

    /// Send a request and wait for the whole response.
    async fn complete(
        &self,
        request: &ChatPost,
        authorization: Option<&str>,
    ) -> std::result::Result<UpstreamReply, UpstreamError>;

    /// Send a request and receive the body incrementally.
    ///
    /// Default implementation calls `complete()` and yields the body as a single chunk.
    async fn stream(
        &self,
        request: &ChatPost,
        authorization: Option<&str>,
    ) -> std::result::Result<UpstreamStream, UpstreamError> {
        let reply = self.complete(request, authorization).await?;
        let body = futures::stream::once(async move { Ok(reply.body) });
        Ok(UpstreamStream {
            status: reply.status,
            content_type: reply.content_type,
            body: Box::pin(body),
        })
    }
}
