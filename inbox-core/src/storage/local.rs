//! Local filesystem inboxes

use super::{canonical_path, is_valid_username, key_of, Result, StorageError, StorageRoot};
use std::path::{Path, PathBuf};

/// Per-user home directories under a common root
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a store rooted at `root`, made absolute against the current
    /// directory. The root itself is created lazily by `prepare`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::path::absolute(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn home_of(&self, user: &str) -> PathBuf {
        self.root.join(user)
    }

    /// Local file behind a session path of `user`
    pub fn resolve(&self, user: &str, path: &str) -> PathBuf {
        let key = key_of(&canonical_path(path));
        let home = self.home_of(user);
        if key.is_empty() { home } else { home.join(key) }
    }

    /// Create the home directory of `user` if it does not exist yet.
    ///
    /// Names that are not a single plain path segment are refused, so a
    /// home never lands outside the root.
    pub async fn prepare(&self, user: &str) -> Result<StorageRoot> {
        if !is_valid_username(user) {
            return Err(StorageError::InvalidUser(user.to_string()));
        }
        let home = self.home_of(user);
        tokio::fs::create_dir_all(&home).await?;
        tracing::info!("Inbox initialized: {}", home.display());

        Ok(StorageRoot {
            user: user.to_string(),
            home,
            bucket: None,
        })
    }
}
