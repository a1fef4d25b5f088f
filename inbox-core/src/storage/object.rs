//! Object-store inboxes
//!
//! Each user owns a bucket named after them. The local home directory is a
//! staging area; completed uploads are copied into the bucket under the
//! file's session path (without the leading separator). Directories do not
//! exist in the store, so moving one means moving every key under its
//! prefix.

use super::{key_of, canonical_path, LocalStorage, Result, StorageError, StorageRoot};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Minimal object-store client interface
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Check whether a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Create a bucket; `StorageError::AlreadyExists` if someone beat us to it
    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Stream the file at `local_path` into `key`, returning the bytes sent
    async fn put_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<u64>;

    /// Server-side copy within a bucket
    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<()>;

    /// Delete an object (missing objects are not an error)
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// List every key starting with `prefix`
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}

/// Object-store backend with a local staging area
pub struct ObjectStorage {
    staging: LocalStorage,
    client: Arc<dyn ObjectClient>,
}

impl ObjectStorage {
    pub fn new(staging: LocalStorage, client: Arc<dyn ObjectClient>) -> Self {
        Self { staging, client }
    }

    pub fn staging(&self) -> &LocalStorage {
        &self.staging
    }

    pub fn bucket_for(&self, user: &str) -> String {
        user.to_string()
    }

    /// Create the staging home and the user's bucket if absent.
    pub async fn prepare(&self, user: &str) -> Result<StorageRoot> {
        let mut root = self.staging.prepare(user).await?;
        let bucket = self.bucket_for(user);

        if !self.client.bucket_exists(&bucket).await? {
            match self.client.create_bucket(&bucket).await {
                Ok(()) => tracing::info!("Created bucket {}", bucket),
                Err(StorageError::AlreadyExists(_)) => {
                    tracing::debug!("Bucket {} created concurrently", bucket)
                }
                Err(e) => return Err(e),
            }
        }

        root.bucket = Some(bucket);
        Ok(root)
    }

    /// Copy a staged file into the user's bucket.
    pub async fn upload(&self, user: &str, key: &str, local_path: &Path, sync: bool) -> Result<()> {
        let bucket = self.bucket_for(user);

        if sync {
            return transfer(self.client.as_ref(), &bucket, key, local_path).await;
        }

        let client = self.client.clone();
        let key = key.to_string();
        let local_path = local_path.to_path_buf();
        tokio::spawn(async move {
            if let Err(e) = transfer(client.as_ref(), &bucket, &key, &local_path).await {
                tracing::error!("Background upload of {}/{} failed: {}", bucket, key, e);
            }
        });
        Ok(())
    }

    /// Move `src` to `dst` inside the user's bucket.
    ///
    /// The rename has already happened in the staging area, so the
    /// destination tells whether a directory or a single file moved.
    pub async fn move_entry(&self, user: &str, src: &str, dst: &str) -> Result<()> {
        let bucket = self.bucket_for(user);
        let src_key = key_of(&canonical_path(src));
        let dst_key = key_of(&canonical_path(dst));
        tracing::info!("Moving {} to {}", src_key, dst_key);

        let is_dir = tokio::fs::metadata(self.staging.resolve(user, dst))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        if !is_dir {
            self.client.copy_object(&bucket, &src_key, &dst_key).await?;
            return self.client.delete_object(&bucket, &src_key).await;
        }

        let src_prefix = format!("{}/", src_key);
        let dst_prefix = format!("{}/", dst_key);
        for key in self.client.list_keys(&bucket, &src_prefix).await? {
            let Some(suffix) = key.strip_prefix(&src_prefix) else {
                continue;
            };
            let target = format!("{}{}", dst_prefix, suffix);
            self.client.copy_object(&bucket, &key, &target).await?;
            self.client.delete_object(&bucket, &key).await?;
        }
        Ok(())
    }

    /// Delete the object behind a session path.
    pub async fn remove(&self, user: &str, path: &str) -> Result<()> {
        let bucket = self.bucket_for(user);
        let key = key_of(&canonical_path(path));
        tracing::info!("Removing object {}/{}", bucket, key);
        self.client.delete_object(&bucket, &key).await
    }
}

async fn transfer(client: &dyn ObjectClient, bucket: &str, key: &str, local_path: &Path) -> Result<()> {
    let size = client.put_file(bucket, key, local_path).await?;
    tracing::info!("Uploaded {} bytes to {}/{}", size, bucket, key);
    Ok(())
}
