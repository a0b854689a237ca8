use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Logical mount segment for lyric-timing files. Playback clients address all
/// LRC blobs under this prefix regardless of which upload slot produced them.
pub const LRC_MOUNT: &str = "lrc";

pub fn with_lrc_mount(path: &str) -> String {
    if path.starts_with("lrc/") {
        path.to_string()
    } else {
        format!("{}/{}", LRC_MOUNT, path)
    }
}

/// Durable keyed storage for uploaded media. Paths are opaque identifiers to
/// every other component.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, content: &[u8], slot: &str) -> Result<String>;
    /// Idempotent: deleting an absent path is a no-op.
    async fn delete(&self, path: &str) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Best-effort cleanup: a lost stray file is preferable to a catalog mutation
/// or entitlement transition blocked on storage. Never participates in the
/// owning mutation's outcome.
pub async fn delete_quietly(store: &dyn BlobStore, path: &str) {
    if path.is_empty() {
        return;
    }
    if let Err(e) = store.delete(path).await {
        tracing::warn!("failed to delete blob {}: {}", path, e);
    }
}

#[derive(Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        // Opaque keys stay inside the upload root.
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(AppError::Config(format!("invalid blob path: {}", path)));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, content: &[u8], slot: &str) -> Result<String> {
        let key = format!("{}/{}", slot, Uuid::new_v4());
        let full = self.resolve(&key)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(key)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lrc_mount_prefix_is_stable() {
        assert_eq!(with_lrc_mount("EnglishLRC/a.lrc"), "lrc/EnglishLRC/a.lrc");
        // Already-mounted paths are not double-prefixed.
        assert_eq!(with_lrc_mount("lrc/EnglishLRC/a.lrc"), "lrc/EnglishLRC/a.lrc");
    }

    #[tokio::test]
    async fn store_delete_exists_cycle() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();

        let key = store.store(b"audio-bytes", "EnglishFile").await.unwrap();
        assert!(key.starts_with("EnglishFile/"));
        assert!(store.exists(&key).await.unwrap());

        store.delete(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());

        // Second delete is a no-op, not an error.
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();
        assert!(store.exists("../outside").await.is_err());
        assert!(store.delete("/etc/passwd").await.is_err());
    }
}
