//! Storage abstraction for user inboxes
//!
//! Uploaded bytes always land in a per-user home directory first (the
//! file-transfer layer writes them there). The backend decides what happens
//! next:
//! - `Local`: the home directory is the final destination
//! - `ObjectStore`: the home directory is a staging area mirrored into a
//!   per-user bucket
//!
//! Session paths are the paths a client sees (`/dir/file`), rooted at the
//! user's home.

pub mod local;
pub mod memory;
pub mod object;
pub mod s3;

pub use local::LocalStorage;
pub use memory::MemoryObjectClient;
pub use object::{ObjectClient, ObjectStorage};
pub use s3::S3ObjectClient;

use crate::config::{BackendKind, StorageConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Bucket not found: {0}")]
    NoSuchBucket(String),

    #[error("Bucket already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid user name: {0:?}")]
    InvalidUser(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A user's provisioned storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoot {
    pub user: String,
    /// Local home directory the file-transfer layer writes into
    pub home: PathBuf,
    /// Bucket mirroring the home directory, for object storage
    pub bucket: Option<String>,
}

/// Normalise a session path: leading `/`, no `.` or empty segments, `..`
/// resolved and clamped at the root.
pub fn canonical_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Whether `name` can serve as a user's home directory name and as a single
/// URL path segment: non-empty, not `.` or `..`, no separators or control
/// characters.
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

/// Storage key for a session path: the path without leading separators
pub fn key_of(path: &str) -> String {
    path.trim_start_matches(['/', '\\']).to_string()
}

/// Storage backend, selected once at startup
pub enum StorageBackend {
    Local(LocalStorage),
    ObjectStore(ObjectStorage),
}

impl StorageBackend {
    /// Build the backend described by `config`.
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let local = LocalStorage::new(&config.root)?;
        match config.backend {
            BackendKind::Local => Ok(StorageBackend::Local(local)),
            BackendKind::S3 => {
                let client = S3ObjectClient::connect(&config.s3).await;
                Ok(StorageBackend::ObjectStore(ObjectStorage::new(local, Arc::new(client))))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StorageBackend::Local(_) => "local",
            StorageBackend::ObjectStore(_) => "object-store",
        }
    }

    fn local(&self) -> &LocalStorage {
        match self {
            StorageBackend::Local(local) => local,
            StorageBackend::ObjectStore(object) => object.staging(),
        }
    }

    /// Create the user's storage if absent. Safe to call repeatedly and
    /// concurrently.
    pub async fn prepare(&self, user: &str) -> Result<StorageRoot> {
        match self {
            StorageBackend::Local(local) => local.prepare(user).await,
            StorageBackend::ObjectStore(object) => object.prepare(user).await,
        }
    }

    /// Transfer the bytes at `local_path` to `key`.
    ///
    /// With `sync` the call returns once the store has acknowledged the
    /// write; otherwise once the transfer is scheduled.
    pub async fn upload(&self, user: &str, key: &str, local_path: &Path, sync: bool) -> Result<()> {
        match self {
            StorageBackend::Local(_) => Ok(()),
            StorageBackend::ObjectStore(object) => object.upload(user, key, local_path, sync).await,
        }
    }

    /// Mirror a rename of `src` to `dst` (session paths).
    pub async fn move_entry(&self, user: &str, src: &str, dst: &str) -> Result<()> {
        match self {
            StorageBackend::Local(_) => {
                tracing::debug!("User {} moved {} to {}", user, src, dst);
                Ok(())
            }
            StorageBackend::ObjectStore(object) => object.move_entry(user, src, dst).await,
        }
    }

    /// Mirror a removal of `path` (session path).
    pub async fn remove(&self, user: &str, path: &str) -> Result<()> {
        match self {
            StorageBackend::Local(_) => Ok(()),
            StorageBackend::ObjectStore(object) => object.remove(user, path).await,
        }
    }

    /// Storage key for a session path
    pub fn key_of(&self, path: &str) -> String {
        key_of(&canonical_path(path))
    }

    /// Local home directory of `user`
    pub fn home_of(&self, user: &str) -> PathBuf {
        self.local().home_of(user)
    }

    /// Local file backing a session path
    pub fn local_path(&self, user: &str, path: &str) -> PathBuf {
        self.local().resolve(user, path)
    }

    /// Path value written into published descriptors: the absolute local
    /// path, or the storage key for object storage.
    pub fn descriptor_path(&self, user: &str, path: &str) -> String {
        match self {
            StorageBackend::Local(local) => local.resolve(user, path).to_string_lossy().into_owned(),
            StorageBackend::ObjectStore(_) => self.key_of(path),
        }
    }
}
