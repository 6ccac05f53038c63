//! Durable local collection of vault references, keyed by id.

pub mod memory;
pub mod models;
pub mod sqlite;

use crate::error::AppResult;
use async_trait::async_trait;
use std::sync::Arc;

pub use memory::MemoryVaultStore;
pub use models::VaultReference;
pub use sqlite::SqliteVaultStore;

#[async_trait]
pub trait VaultStore: Send + Sync {
    /// Insert a new reference. Fails with `Persistence` if the id already exists.
    async fn save(&self, vault: &VaultReference) -> AppResult<()>;

    async fn get(&self, id: &str) -> AppResult<Option<VaultReference>>;

    /// All references, newest first.
    async fn list(&self) -> AppResult<Vec<VaultReference>>;

    /// Remove a reference. Returns whether one was present.
    async fn delete(&self, id: &str) -> AppResult<bool>;

    async fn contains(&self, id: &str) -> AppResult<bool> {
        Ok(self.get(id).await?.is_some())
    }
}

pub type SharedVaultStore = Arc<dyn VaultStore>;
