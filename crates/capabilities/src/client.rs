//! Fan-out client.
//!
//! Every operation starts one task per server, waits for all of them, and
//! concatenates the results in server order. A server that fails for any
//! reason is logged and contributes nothing.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use chatgate_core::error::CapabilityError;
use chatgate_core::{CapabilityServer, ChatMessage, ToolDefinition, ToolProps};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Deserialize)]
struct ToolsResponse {
    tools: Vec<ToolDefinition>,
}

#[derive(Deserialize)]
struct PropsResponse {
    props: Vec<ToolProps>,
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    user_id: i64,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ExecuteResponse {
    tool_res_messages: Vec<ChatMessage>,
}

/// Talks to any number of capability servers concurrently.
#[derive(Clone)]
pub struct CapabilityClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl CapabilityClient {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Tool definitions advertised by every server.
    pub async fn list_tools(&self, servers: &[CapabilityServer]) -> Vec<ToolDefinition> {
        let timeout = self.timeout;
        self.fan_out(servers, "tools", move |client, address| async move {
            let url = format!("{address}/tools");
            let response: ToolsResponse = fetch(client.get(url).timeout(timeout), &address).await?;
            Ok(response.tools)
        })
        .await
    }

    /// Per-tool usage guidance from every server.
    pub async fn list_tool_props(&self, servers: &[CapabilityServer]) -> Vec<ToolProps> {
        let timeout = self.timeout;
        self.fan_out(servers, "tools-props", move |client, address| async move {
            let url = format!("{address}/tools-props");
            let response: PropsResponse = fetch(client.get(url).timeout(timeout), &address).await?;
            Ok(response.props)
        })
        .await
    }

    /// Let every server answer the tool calls it owns.
    ///
    /// Each server receives the whole conversation and the user id.
    pub async fn execute_tools(
        &self,
        servers: &[CapabilityServer],
        user_id: i64,
        messages: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        // Serialized once, shared by every task.
        let body = match serde_json::to_vec(&ExecuteRequest { user_id, messages }) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                warn!(error = %e, "Could not encode tools-execute request");
                return Vec::new();
            }
        };

        let timeout = self.timeout;
        self.fan_out(servers, "tools-execute", move |client, address| {
            let body = body.clone();
            async move {
                let url = format!("{address}/tools-execute");
                let request = client
                    .post(url)
                    .header("Content-Type", "application/json")
                    .body(body)
                    .timeout(timeout);
                let response: ExecuteResponse = fetch(request, &address).await?;
                Ok(response.tool_res_messages)
            }
        })
        .await
    }

    async fn fan_out<T, F, Fut>(&self, servers: &[CapabilityServer], endpoint: &'static str, call: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(reqwest::Client, String) -> Fut,
        Fut: Future<Output = Result<Vec<T>, CapabilityError>> + Send + 'static,
    {
        if servers.is_empty() {
            return Vec::new();
        }

        let handles: Vec<_> = servers
            .iter()
            .map(|server| tokio::spawn(call(self.client.clone(), server.address.clone())))
            .collect();

        let outcomes = futures::future::join_all(handles).await;

        let mut merged = Vec::new();
        for (server, outcome) in servers.iter().zip(outcomes) {
            let result = outcome.unwrap_or_else(|e| Err(CapabilityError::TaskFailed(e.to_string())));
            match result {
                Ok(items) => {
                    debug!(server = %server.address, endpoint, count = items.len(), "Capability server answered");
                    merged.extend(items);
                }
                Err(e) => {
                    warn!(server = %server.address, endpoint, error = %e, "Capability server skipped");
                }
            }
        }
        merged
    }
}

async fn fetch<R: DeserializeOwned>(request: reqwest::RequestBuilder, address: &str) -> Result<R, CapabilityError> {
    let response = request.send().await.map_err(|e| CapabilityError::Unreachable {
        server: address.to_string(),
        reason: e.to_string(),
    })?;

    let status = response.status().as_u16();
    if status != 200 {
        return Err(CapabilityError::BadStatus {
            server: address.to_string(),
            status,
        });
    }

    response.json().await.map_err(|e| CapabilityError::InvalidPayload {
        server: address.to_string(),
        reason: e.to_string(),
    })
}
