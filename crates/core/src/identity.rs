//! Caller identity — who a bearer token belongs to.
//!
//! The gateway does not issue tokens. It forwards the caller's
//! `Authorization` header to an identity service and trusts the `auth`
//! object that comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// The identity record the identity service returns for a valid token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthItem {
    pub api_key: String,
    pub scope: String,
    pub user_id: i64,
    pub user_email: String,
    pub created_at: String,
}

/// Validates an `Authorization` header against an identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Look up the identity behind `authorization` (the full header value).
    ///
    /// `Ok(None)` means the service answered and rejected the token;
    /// `Err` means the service could not be asked.
    async fn fetch(&self, authorization: &str) -> Result<Option<AuthItem>, AuthError>;
}

/// Extract the token from a `Bearer <token>` header value.
///
/// Any other shape yields `None`.
pub fn bearer_token(header: &str) -> Option<&str> {
    let rest = header.strip_prefix("Bearer")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}
