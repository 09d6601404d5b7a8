//! In-memory archive for development and tests

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use etl_core::{archive_key, ArchiveStore, Fingerprint, StoreResult};

#[derive(Clone, Default)]
pub struct MemoryArchiveStore {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn put(&self, fingerprint: &Fingerprint, filename: &str, content: &[u8]) -> StoreResult<String> {
        let key = archive_key(fingerprint, filename);
        self.entries.write().await.insert(key.clone(), content.to_vec());
        Ok(key)
    }

    async fn delete_by_prefix(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(fingerprint.as_str()));
        Ok(entries.len() < before)
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_list_delete() {
        let archive = MemoryArchiveStore::new();
        let fp = Fingerprint::of(b"payload");

        let key = archive.put(&fp, "notes.txt", b"payload").await.unwrap();
        assert_eq!(archive.list().await.unwrap(), vec![key.clone()]);
        assert_eq!(archive.get(&key).await.unwrap(), Some(b"payload".to_vec()));

        assert!(archive.delete_by_prefix(&fp).await.unwrap());
        assert!(archive.is_empty().await);
        assert!(!archive.delete_by_prefix(&fp).await.unwrap());
    }
}
