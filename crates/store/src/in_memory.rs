//! In-memory store — useful for testing and ephemeral deployments.

use async_trait::async_trait;
use chatgate_core::error::StoreError;
use chatgate_core::{CapabilityServer, CapabilityStore, ServerOwner};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Keeps every user's servers in a map. Lost on restart.
pub struct InMemoryStore {
    rows: RwLock<HashMap<i64, Vec<CapabilityServer>>>,
    next_id: std::sync::atomic::AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            next_id: std::sync::atomic::AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn user_servers(&self, user_id: i64) -> Result<Vec<CapabilityServer>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_user_servers(
        &self,
        user_id: i64,
        servers: &[CapabilityServer],
    ) -> Result<(), StoreError> {
        let rows: Vec<CapabilityServer> = servers
            .iter()
            .map(|s| CapabilityServer {
                id: Some(self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed)),
                owner: ServerOwner::User(user_id),
                address: s.address.clone(),
                is_active: s.is_active,
            })
            .collect();
        self.rows.write().await.insert(user_id, rows);
        Ok(())
    }
}
