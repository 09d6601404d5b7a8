//! Filesystem archive
//!
//! Stores each upload as a flat file named `{fingerprint}_{filename}` inside a
//! single directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use etl_core::{archive_key, ArchiveStore, Fingerprint, StoreResult};
use crate::Result;

#[derive(Debug, Clone)]
pub struct FsArchiveStore {
    dir: PathBuf,
}

impl FsArchiveStore {
    /// Open the archive, creating the directory if needed
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn entry_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => warn!(name = ?name, "Skipping archive entry with non UTF-8 name"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn remove_prefixed(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let mut removed = false;
        for name in self.entry_names().await? {
            if name.starts_with(fingerprint.as_str()) {
                tokio::fs::remove_file(self.dir.join(&name)).await?;
                debug!(key = %name, "Removed archive entry");
                removed = true;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl ArchiveStore for FsArchiveStore {
    async fn put(&self, fingerprint: &Fingerprint, filename: &str, content: &[u8]) -> StoreResult<String> {
        let key = archive_key(fingerprint, filename);
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&key), content).await?;
        debug!(key = %key, size = content.len(), "Archived upload");
        Ok(key)
    }

    async fn delete_by_prefix(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        Ok(self.remove_prefixed(fingerprint).await?)
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        Ok(self.entry_names().await?)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if key.contains(['/', '\\']) {
            return Ok(None);
        }
        match tokio::fs::read(self.dir.join(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_put_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsArchiveStore::open(dir.path()).await.unwrap();
        let fp = Fingerprint::of(b"a,b\n1,2\n");

        let key = archive.put(&fp, "data.csv", b"a,b\n1,2\n").await.unwrap();

        assert_eq!(key, format!("{}_data.csv", fp));
        assert_eq!(archive.get(&key).await.unwrap(), Some(b"a,b\n1,2\n".to_vec()));
        assert!(dir.path().join(&key).is_file());
    }

    #[tokio::test]
    async fn test_delete_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsArchiveStore::open(dir.path()).await.unwrap();
        let fp = Fingerprint::of(b"one");
        let other = Fingerprint::of(b"two");

        archive.put(&fp, "a.txt", b"one").await.unwrap();
        archive.put(&fp, "b.txt", b"one").await.unwrap();
        archive.put(&other, "c.txt", b"two").await.unwrap();

        assert!(archive.delete_by_prefix(&fp).await.unwrap());
        assert_eq!(archive.list().await.unwrap(), vec![format!("{}_c.txt", other)]);

        assert!(!archive.delete_by_prefix(&fp).await.unwrap());
    }

    #[tokio::test]
    async fn test_filename_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsArchiveStore::open(dir.path().join("archive")).await.unwrap();
        let fp = Fingerprint::of(b"x");

        let key = archive.put(&fp, "../outside.txt", b"x").await.unwrap();

        assert!(!key.contains('/'));
        assert_eq!(archive.list().await.unwrap(), vec![key]);
        assert!(archive.get("../outside.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsArchiveStore::open(dir.path()).await.unwrap();

        assert!(archive.get("nothing").await.unwrap().is_none());
        assert!(archive.list().await.unwrap().is_empty());
    }
}
