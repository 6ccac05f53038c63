use super::{VaultReference, VaultStore};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Process-local store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryVaultStore {
    vaults: DashMap<String, VaultReference>,
}

impl MemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }
}

#[async_trait]
impl VaultStore for MemoryVaultStore {
    async fn save(&self, vault: &VaultReference) -> AppResult<()> {
        match self.vaults.entry(vault.id.clone()) {
            Entry::Occupied(_) => Err(AppError::persistence(format!(
                "Vault {} already exists",
                vault.short_id()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(vault.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &str) -> AppResult<Option<VaultReference>> {
        Ok(self.vaults.get(id).map(|v| v.value().clone()))
    }

    async fn list(&self) -> AppResult<Vec<VaultReference>> {
        let mut vaults: Vec<_> = self.vaults.iter().map(|v| v.value().clone()).collect();
        vaults.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(vaults)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.vaults.remove(id).is_some())
    }

    async fn contains(&self, id: &str) -> AppResult<bool> {
        Ok(self.vaults.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::fixtures::vault;

    #[tokio::test]
    async fn test_crud() {
        let store = MemoryVaultStore::new();
        let v = vault("abc");

        store.save(&v).await.unwrap();
        assert_eq!(store.get("abc").await.unwrap(), Some(v.clone()));
        assert!(store.contains("abc").await.unwrap());

        assert!(matches!(
            store.save(&v).await,
            Err(AppError::Persistence(_))
        ));

        assert!(store.delete("abc").await.unwrap());
        assert!(!store.delete("abc").await.unwrap());
        assert_eq!(store.get("abc").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = MemoryVaultStore::new();
        let older = vault("older");
        let mut newer = vault("newer");
        newer.created_at = older.created_at + chrono::Duration::seconds(10);

        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();

        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }
}
