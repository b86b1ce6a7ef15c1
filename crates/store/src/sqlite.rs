//! SQLite store.
//!
//! One table, `capability_servers(id, user_id, address, is_active)`. A
//! user's list is always replaced as a whole inside one transaction, so a
//! reader sees either the old list or the new one.

use async_trait::async_trait;
use chatgate_core::error::StoreError;
use chatgate_core::{CapabilityServer, CapabilityStore, ServerOwner};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url`.
    ///
    /// Accepts `sqlite://path/to/file.db`, a bare path, or `:memory:`.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite url: {e}")))?
            .create_if_missing(true);

        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        StoreError::Storage(format!("Cannot create {}: {e}", parent.display()))
                    })?;
                }
            }
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // Each in-memory connection is its own database.
        let max_connections = if in_memory { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite capability store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS capability_servers (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL,
                address    TEXT NOT NULL,
                is_active  BOOLEAN NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("capability_servers table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_capability_servers_user ON capability_servers(user_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("user_id index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_server(row: &sqlx::sqlite::SqliteRow) -> Result<CapabilityServer, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: i64 = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let address: String = row
            .try_get("address")
            .map_err(|e| StoreError::QueryFailed(format!("address column: {e}")))?;
        let is_active: bool = row
            .try_get("is_active")
            .map_err(|e| StoreError::QueryFailed(format!("is_active column: {e}")))?;

        Ok(CapabilityServer {
            id: Some(id),
            owner: ServerOwner::User(user_id),
            address,
            is_active,
        })
    }
}

#[async_trait]
impl CapabilityStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn user_servers(&self, user_id: i64) -> Result<Vec<CapabilityServer>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, address, is_active FROM capability_servers WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT failed: {e}")))?;

        rows.iter().map(Self::row_to_server).collect()
    }

    async fn replace_user_servers(
        &self,
        user_id: i64,
        servers: &[CapabilityServer],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query("DELETE FROM capability_servers WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("DELETE failed: {e}")))?;

        for server in servers {
            sqlx::query(
                "INSERT INTO capability_servers (user_id, address, is_active) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(&server.address)
            .bind(server.is_active)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("INSERT failed: {e}")))?;
        }

        // Dropping `tx` without commit rolls everything back.
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(user_id, count = servers.len(), "Capability servers replaced");
        Ok(())
    }
}
