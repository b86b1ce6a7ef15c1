//! Identity service client.
//!
//! `GET {base}/auth` with the caller's `Authorization` header. A valid token
//! answers `{"auth": {...}}`; anything else means "no identity".

use async_trait::async_trait;
use chatgate_core::error::AuthError;
use chatgate_core::{AuthItem, IdentityProvider};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpIdentity {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Deserialize)]
struct AuthEnvelope {
    #[serde(default)]
    auth: Option<AuthItem>,
}

impl HttpIdentity {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentity {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, authorization: &str) -> Result<Option<AuthItem>, AuthError> {
        let url = format!("{}/auth", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", authorization)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            debug!(status, "Identity service rejected token");
            return Ok(None);
        }

        let envelope: AuthEnvelope = response.json().await.map_err(|e| {
            warn!(error = %e, "Identity service returned unreadable body");
            AuthError::InvalidResponse(e.to_string())
        })?;

        Ok(envelope.auth)
    }
}
