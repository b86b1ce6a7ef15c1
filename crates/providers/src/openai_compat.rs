//! OpenAI-compatible upstream.
//!
//! Forwards the prepared `ChatPost` to `{base}/chat/completions` with the
//! caller's own `Authorization` header. Responses are not interpreted here:
//! buffered bodies come back as bytes, streamed bodies as a byte stream.

use async_trait::async_trait;
use chatgate_core::error::UpstreamError;
use chatgate_core::{ChatPost, Upstream, UpstreamReply, UpstreamStream};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible completions endpoint.
pub struct OpenAiCompatUpstream {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OpenAiCompatUpstream {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, post: &ChatPost, authorization: Option<&str>) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(post);
        if let Some(auth) = authorization {
            builder = builder.header("Authorization", auth);
        }
        builder
    }
}

fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

#[async_trait]
impl Upstream for OpenAiCompatUpstream {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(
        &self,
        request: &ChatPost,
        authorization: Option<&str>,
    ) -> Result<UpstreamReply, UpstreamError> {
        debug!(model = %request.model, messages = request.messages.len(), "Sending completion request");

        let response = self
            .request(request, authorization)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = content_type(&response);
        if !response.status().is_success() {
            warn!(status, "Upstream returned error");
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::StreamInterrupted(e.to_string()))?;

        Ok(UpstreamReply {
            status,
            content_type,
            body,
        })
    }

    async fn stream(
        &self,
        request: &ChatPost,
        authorization: Option<&str>,
    ) -> Result<UpstreamStream, UpstreamError> {
        debug!(model = %request.model, messages = request.messages.len(), "Sending streaming request");

        let response = self
            .request(request, authorization)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = content_type(&response);
        if !response.status().is_success() {
            warn!(status, "Upstream streaming error");
        }

        // Dropping this stream drops the response and releases the connection.
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| UpstreamError::StreamInterrupted(e.to_string())));

        Ok(UpstreamStream {
            status,
            content_type,
            body: Box::pin(body),
        })
    }
}
