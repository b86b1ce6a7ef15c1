//! Which capability servers a user's requests fan out to.
//!
//! The set is read from the store on every request and merged with the
//! configured defaults; nothing is cached between requests.

use std::sync::Arc;

use chatgate_core::capability::{active_servers, normalize_address};
use chatgate_core::error::StoreError;
use chatgate_core::{CapabilityServer, CapabilityStore};
use tracing::warn;

pub struct ServerDirectory {
    store: Arc<dyn CapabilityStore>,
    defaults: Vec<CapabilityServer>,
}

impl ServerDirectory {
    /// `defaults` are addresses active for every user.
    pub fn new(store: Arc<dyn CapabilityStore>, defaults: &[String]) -> Self {
        Self {
            store,
            defaults: defaults.iter().map(CapabilityServer::global).collect(),
        }
    }

    pub fn defaults(&self) -> &[CapabilityServer] {
        &self.defaults
    }

    /// Active servers for `user_id`.
    ///
    /// A store failure is logged and only the defaults are used, so a broken
    /// database degrades tool availability instead of failing the request.
    pub async fn active_for(&self, user_id: i64) -> Vec<CapabilityServer> {
        let persisted = match self.store.user_servers(user_id).await {
            Ok(servers) => servers,
            Err(e) => {
                warn!(user_id, store = self.store.name(), error = %e, "Could not read capability servers");
                Vec::new()
            }
        };
        active_servers(&persisted, &self.defaults)
    }

    /// Everything to show the user: their own servers, then the defaults.
    pub async fn listing(&self, user_id: i64) -> Result<Vec<CapabilityServer>, StoreError> {
        let mut servers = self.store.user_servers(user_id).await?;
        servers.extend(self.defaults.iter().cloned());
        Ok(servers)
    }

    /// Replace the user's servers and return them as stored.
    pub async fn replace(
        &self,
        user_id: i64,
        entries: &[(String, bool)],
    ) -> Result<Vec<CapabilityServer>, StoreError> {
        let servers: Vec<CapabilityServer> = entries
            .iter()
            .map(|(address, is_active)| CapabilityServer {
                id: None,
                owner: chatgate_core::ServerOwner::User(user_id),
                address: normalize_address(address),
                is_active: *is_active,
            })
            .collect();
        self.store.replace_user_servers(user_id, &servers).await?;
        self.store.user_servers(user_id).await
    }
}
