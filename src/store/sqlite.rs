use super::models::VaultRow;
use super::{VaultReference, VaultStore};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

pub type DbPool = Pool<Sqlite>;

/// Vault store backed by a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteVaultStore {
    pool: DbPool,
}

impl SqliteVaultStore {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;
        info!("Vault database connected: {}", url);

        let store = Self::from_pool(pool);
        store.init_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn init_schema(&self) -> AppResult<()> {
        debug!("Ensuring vault schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vaults (
                id TEXT PRIMARY KEY NOT NULL,
                unlock_time INTEGER NOT NULL,
                wrapped_key TEXT NOT NULL,
                wrapped_key_digest TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                encoded_payload TEXT NOT NULL DEFAULT '',
                content_id TEXT,
                destroy_after_read BOOLEAN NOT NULL DEFAULT false,
                name TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vaults_created ON vaults(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl VaultStore for SqliteVaultStore {
    async fn save(&self, vault: &VaultReference) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO vaults (id, unlock_time, wrapped_key, wrapped_key_digest, created_at, encoded_payload, content_id, destroy_after_read, name)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&vault.id)
        .bind(vault.unlock_time.timestamp_millis())
        .bind(&vault.wrapped_key)
        .bind(&vault.wrapped_key_digest)
        .bind(vault.created_at.timestamp_millis())
        .bind(&vault.encoded_payload)
        .bind(&vault.content_id)
        .bind(vault.destroy_after_read)
        .bind(&vault.name)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::persistence(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::persistence(format!(
                "Vault {} already exists",
                vault.short_id()
            )));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<VaultReference>> {
        let row = sqlx::query_as::<_, VaultRow>("SELECT * FROM vaults WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn list(&self) -> AppResult<Vec<VaultReference>> {
        let rows =
            sqlx::query_as::<_, VaultRow>("SELECT * FROM vaults ORDER BY created_at DESC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM vaults WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::persistence(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn contains(&self, id: &str) -> AppResult<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM vaults WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }
}

#[cfg(test)]
pub(crate) async fn setup_test_store() -> SqliteVaultStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    let store = SqliteVaultStore::from_pool(pool);
    store.init_schema().await.expect("Failed to init schema");
    store
}
