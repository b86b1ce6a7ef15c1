//! Capability servers — remote services that contribute tools, per-tool
//! prompt fragments, and tool execution.
//!
//! Each user has their own list; the configured defaults are always active
//! for everyone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Whose list a server belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "user_id")]
pub enum ServerOwner {
    User(i64),
    /// Configured defaults, shared by every user
    Global,
}

impl ServerOwner {
    /// The owner as stored: global servers use `-1`.
    pub fn as_user_id(&self) -> i64 {
        match self {
            Self::User(id) => *id,
            Self::Global => -1,
        }
    }
}

/// One capability server record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityServer {
    /// Row id, once persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub owner: ServerOwner,

    /// Base URL, ending in `/v1`
    pub address: String,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl CapabilityServer {
    /// A configured default server.
    pub fn global(address: impl AsRef<str>) -> Self {
        Self {
            id: None,
            owner: ServerOwner::Global,
            address: normalize_address(address.as_ref()),
            is_active: true,
        }
    }

    /// A server belonging to `user_id`.
    pub fn for_user(user_id: i64, address: impl AsRef<str>, is_active: bool) -> Self {
        Self {
            id: None,
            owner: ServerOwner::User(user_id),
            address: normalize_address(address.as_ref()),
            is_active,
        }
    }
}

/// Trim trailing slashes and make sure the address ends in `/v1`.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

/// The user's persisted servers followed by the defaults, keeping only
/// active ones. An address listed twice is contacted once.
pub fn active_servers(
    persisted: &[CapabilityServer],
    defaults: &[CapabilityServer],
) -> Vec<CapabilityServer> {
    let mut servers: Vec<CapabilityServer> = Vec::new();
    for server in persisted.iter().chain(defaults).filter(|s| s.is_active) {
        if !servers.iter().any(|s| s.address == server.address) {
            servers.push(server.clone());
        }
    }
    servers
}

/// Persistence for per-user capability server lists.
#[async_trait]
pub trait CapabilityStore: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Every server stored for `user_id`, active or not.
    async fn user_servers(&self, user_id: i64) -> Result<Vec<CapabilityServer>, StoreError>;

    /// Atomically replace the user's whole list.
    async fn replace_user_servers(
        &self,
        user_id: i64,
        servers: &[CapabilityServer],
    ) -> Result<(), StoreError>;
}
