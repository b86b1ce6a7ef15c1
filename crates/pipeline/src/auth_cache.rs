//! Bearer-token authentication with a time-bounded cache.
//!
//! A token the identity service accepted is trusted for `ttl` without
//! asking again. Rejections and outages are never cached, so a token that
//! failed once is checked afresh on the next request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatgate_core::identity::bearer_token;
use chatgate_core::{AuthItem, IdentityProvider};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Above this many entries, expired ones are swept on insert.
const SWEEP_THRESHOLD: usize = 10_000;

struct CacheEntry {
    item: AuthItem,
    cached_at: Instant,
}

/// Validated identities keyed by bearer token.
///
/// The lock is only held for map reads and writes, never across the
/// identity-service call. Concurrent misses for one token may both fetch;
/// the last write wins.
pub struct AuthCache {
    identity: Arc<dyn IdentityProvider>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl AuthCache {
    pub fn new(identity: Arc<dyn IdentityProvider>, ttl: Duration) -> Self {
        Self {
            identity,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve an `Authorization` header to an identity.
    ///
    /// `None` when the header is missing or not `Bearer <token>`, when the
    /// identity service rejects the token, or when it cannot be reached.
    pub async fn resolve(&self, authorization: Option<&str>) -> Option<AuthItem> {
        let header = authorization?;
        let Some(token) = bearer_token(header) else {
            debug!("Authorization header is not a bearer token");
            return None;
        };

        if let Some(item) = self.lookup(token) {
            return Some(item);
        }

        match self.identity.fetch(header).await {
            Ok(Some(item)) => {
                info!(user_id = item.user_id, provider = self.identity.name(), "Token validated and cached");
                self.insert(token, item.clone());
                Some(item)
            }
            Ok(None) => {
                debug!("Identity service rejected token");
                None
            }
            Err(e) => {
                warn!(error = %e, "Identity service unavailable, treating request as unauthenticated");
                None
            }
        }
    }

    fn lookup(&self, token: &str) -> Option<AuthItem> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(token)?;
        let age = entry.cached_at.elapsed();
        if age >= self.ttl {
            return None;
        }
        debug!(
            user_id = entry.item.user_id,
            remaining_secs = (self.ttl - age).as_secs(),
            "Auth cache hit"
        );
        Some(entry.item.clone())
    }

    fn insert(&self, token: &str, item: AuthItem) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= SWEEP_THRESHOLD {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);
        }
        entries.insert(
            token.to_string(),
            CacheEntry {
                item,
                cached_at: Instant::now(),
            },
        );
    }

    /// Number of cached entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
