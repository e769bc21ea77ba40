//! In-process artifact store that counts fetches and deletes.

use crate::artifacts::{ArtifactChunk, ArtifactError, ArtifactStore, decode_chunks};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Artifact store held in memory.
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
    fetches: AtomicUsize,
    deletes: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes at `bucket`/`key`.
    pub async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), bytes);
    }

    /// Store `chunks` as a JSON array at `bucket`/`key`.
    pub async fn put_chunks(
        &self,
        bucket: &str,
        key: &str,
        chunks: &[ArtifactChunk],
    ) -> Result<(), serde_json::Error> {
        let bytes = serde_json::to_vec(chunks)?;
        self.put(bucket, key, bytes).await;
        Ok(())
    }

    /// Whether an object exists at `bucket`/`key`.
    pub async fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .read()
            .await
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Number of fetch calls served, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of delete calls served.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Make subsequent deletes fail and leave their objects in place.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<ArtifactChunk>, ArtifactError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.read().await;
        let bytes = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| ArtifactError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        decode_chunks(bucket, key, bytes)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ArtifactError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ArtifactError::Delete {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "deletes disabled".into(),
            });
        }
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn stored_chunks_can_be_fetched_and_deleted() {
        let store = MemoryArtifactStore::new();
        let chunk = ArtifactChunk {
            id: None,
            text: "alpha".into(),
            metadata: Map::new(),
        };
        store
            .put_chunks("b", "k", std::slice::from_ref(&chunk))
            .await
            .expect("put");

        assert_eq!(store.fetch("b", "k").await.expect("fetch"), vec![chunk]);
        store.delete("b", "k").await.expect("delete");
        assert!(!store.contains("b", "k").await);
        assert!(matches!(
            store.fetch("b", "k").await,
            Err(ArtifactError::NotFound { .. })
        ));
        assert_eq!(store.fetch_count(), 2);
        assert_eq!(store.delete_count(), 1);
    }

    #[tokio::test]
    async fn failing_deletes_keep_the_object() {
        let store = MemoryArtifactStore::new();
        store.put("b", "k", b"[]".to_vec()).await;
        store.fail_deletes(true);

        assert!(matches!(
            store.delete("b", "k").await,
            Err(ArtifactError::Delete { .. })
        ));
        assert!(store.contains("b", "k").await);
        assert_eq!(store.delete_count(), 1);

        store.fail_deletes(false);
        store.delete("b", "k").await.expect("delete");
        assert!(!store.contains("b", "k").await);
    }
}
