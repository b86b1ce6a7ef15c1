//! HTTP collaborators for chatgate.
//!
//! `HttpIdentity` implements `chatgate_core::IdentityProvider` against an
//! identity service's `/auth` endpoint; `OpenAiCompatUpstream` implements
//! `chatgate_core::Upstream` against any OpenAI-compatible
//! `/chat/completions` endpoint. Both share one connection pool.

pub mod identity;
pub mod openai_compat;

pub use identity::HttpIdentity;
pub use openai_compat::OpenAiCompatUpstream;

use std::time::Duration;

/// Build the process-wide HTTP client.
///
/// Request timeouts are set per call, since streamed completions and
/// capability lookups need very different limits.
pub fn shared_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
}
