//! Local filesystem `NodeStore` — each node's bytes live in a file named
//! by its Base32 key, sharded by the first two characters to bound
//! directory fan-out. Plays the "production" role a connection-pooled
//! SQL store plays for row-shaped records, adapted to files on disk
//! since node bytes are blobs, not rows.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::codec::{derive_key, NodeKey};

use super::traits::{NodeStore, StoreError, StoreResult};

pub struct LocalFsNodeStore {
    root: PathBuf,
    /// When true, `put` recomputes the key from the bytes and rejects a
    /// mismatch with the caller-supplied key (verified mode).
    verified: bool,
}

impl LocalFsNodeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), verified: true }
    }

    pub fn unverified(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), verified: false }
    }

    fn path_for(&self, key: &NodeKey) -> PathBuf {
        let text = key.to_string();
        // "nod_" + 26 chars; shard on the first two chars after the prefix.
        let shard = &text[4..6.min(text.len())];
        self.root.join(shard).join(text)
    }

    async fn ensure_parent(path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Backend(format!("create_dir_all {}: {e}", parent.display())))?;
        }
        Ok(())
    }
}

#[async_trait]
impl NodeStore for LocalFsNodeStore {
    async fn put(&self, key: NodeKey, bytes: Vec<u8>) -> StoreResult<()> {
        if self.verified {
            let computed = derive_key(&bytes);
            if computed != key {
                return Err(StoreError::KeyMismatch { computed: computed.to_string(), supplied: key.to_string() });
            }
        }

        let path = self.path_for(&key);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(()); // idempotent: identical key implies identical bytes
        }

        Self::ensure_parent(&path).await?;
        // write to a temp file then rename, so a crash mid-write never
        // leaves a partially-written node visible under its final name.
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| StoreError::Backend(format!("write {}: {e}", tmp_path.display())))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| StoreError::Backend(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    async fn get(&self, key: &NodeKey) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Backend(format!("read {}: {e}", path.display()))),
        }
    }

    async fn has(&self, key: &NodeKey) -> StoreResult<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempdir();
        let store = LocalFsNodeStore::new(dir.clone());
        let bytes = b"some node bytes".to_vec();
        let key = derive_key(&bytes);

        store.put(key, bytes.clone()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(bytes));
        assert!(store.has(&key).await.unwrap());

        tokio::fs::remove_dir_all(dir).await.ok();
    }

    #[tokio::test]
    async fn test_verified_mode_rejects_key_mismatch() {
        let dir = tempdir();
        let store = LocalFsNodeStore::new(dir.clone());
        let bytes = b"abc".to_vec();
        let wrong_key = NodeKey::from_bytes([9u8; 16]);

        let result = store.put(wrong_key, bytes).await;
        assert!(matches!(result, Err(StoreError::KeyMismatch { .. })));

        tokio::fs::remove_dir_all(dir).await.ok();
    }

    fn tempdir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("casvault-test-{}", uuid::Uuid::new_v4()));
        p
    }
}
