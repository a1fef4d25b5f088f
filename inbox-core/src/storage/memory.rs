//! In-process object store
//!
//! Behaves like a small S3: buckets must exist before objects are written,
//! keys are flat strings listed in lexical order. Uploaded files are held
//! in memory whole.

use super::object::ObjectClient;
use super::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryObjectClient {
    buckets: RwLock<HashMap<String, BTreeMap<String, Bytes>>>,
    bucket_creations: AtomicUsize,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `create_bucket` calls
    pub fn bucket_creations(&self) -> usize {
        self.bucket_creations.load(Ordering::SeqCst)
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets.read().await.get(bucket)?.get(key).cloned()
    }

    /// All keys of a bucket in lexical order
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(bucket) {
            return Err(StorageError::AlreadyExists(bucket.to_string()));
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        self.bucket_creations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn put_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<u64> {
        let data = Bytes::from(tokio::fs::read(local_path).await?);
        let size = data.len() as u64;

        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        objects.insert(key.to_string(), data);
        Ok(size)
    }

    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        let data = objects.get(src_key).cloned().ok_or_else(|| StorageError::NotFound {
            bucket: bucket.to_string(),
            key: src_key.to_string(),
        })?;
        objects.insert(dst_key.to_string(), data);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        objects.remove(key);
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
