//! Session authentication
//!
//! Every failure path (lookup, verification, malformed key) yields a plain
//! `false`; the cause is logged with the username only. On success the
//! user's storage is provisioned and recorded for the session layer.

use crate::credentials::CredentialStore;
use crate::password;
use crate::pubkey::{self, PublicKey};
use crate::storage::{is_valid_username, StorageBackend, StorageRoot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Authentication callbacks invoked by the file-transfer layer during login
#[async_trait]
pub trait TransportAuthenticator: Send + Sync {
    /// Password login
    async fn authenticate_password(&self, username: &str, password: &str) -> bool;

    /// Public-key login with the raw wire blob offered by the client
    async fn authenticate_publickey(&self, username: &str, key_bytes: &[u8]) -> bool;
}

pub struct SessionAuthenticator {
    store: Arc<CredentialStore>,
    storage: Arc<StorageBackend>,
    roots: RwLock<HashMap<String, StorageRoot>>,
}

impl SessionAuthenticator {
    pub fn new(store: Arc<CredentialStore>, storage: Arc<StorageBackend>) -> Self {
        Self {
            store,
            storage,
            roots: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub async fn authenticate_by_password(&self, username: &str, password: &str) -> bool {
        if !acceptable_username(username) {
            return false;
        }

        let record = match self.store.get(username).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Password login for {} rejected: {}", username, e);
                return false;
            }
        };

        if !password::verify(password, &record.password_hash) {
            tracing::info!("Password login for {} rejected: wrong password", username);
            return false;
        }

        self.on_success(username).await;
        true
    }

    pub async fn authenticate_by_public_key(&self, username: &str, key: &PublicKey) -> bool {
        if !acceptable_username(username) {
            return false;
        }

        let record = match self.store.get(username).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Key login for {} rejected: {}", username, e);
                return false;
            }
        };

        let stored = match PublicKey::parse(&record.public_key) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Key login for {} rejected, stored key unusable: {}", username, e);
                return false;
            }
        };

        if !pubkey::equals(&stored, key) {
            tracing::info!("Key login for {} rejected: key mismatch", username);
            return false;
        }

        self.on_success(username).await;
        true
    }

    /// Storage root bound to `username` by its last successful login
    pub async fn storage_root(&self, username: &str) -> Option<StorageRoot> {
        self.roots.read().await.get(username).cloned()
    }

    async fn on_success(&self, username: &str) {
        tracing::info!("User {} authenticated", username);
        match self.storage.prepare(username).await {
            Ok(root) => {
                self.roots.write().await.insert(username.to_string(), root);
            }
            Err(e) => {
                tracing::error!("Failed to prepare storage for {}: {}", username, e);
            }
        }
    }
}

/// Names that cannot map to exactly one identity record and one home
/// directory are refused before any lookup.
fn acceptable_username(username: &str) -> bool {
    if is_valid_username(username) {
        return true;
    }
    if !username.is_empty() {
        tracing::warn!("Login rejected for invalid user name {:?}", username);
    }
    false
}

#[async_trait]
impl TransportAuthenticator for SessionAuthenticator {
    async fn authenticate_password(&self, username: &str, password: &str) -> bool {
        self.authenticate_by_password(username, password).await
    }

    async fn authenticate_publickey(&self, username: &str, key_bytes: &[u8]) -> bool {
        match PublicKey::parse_blob(key_bytes) {
            Ok(key) => self.authenticate_by_public_key(username, &key).await,
            Err(e) => {
                tracing::warn!("Key login for {} rejected: {}", username, e);
                false
            }
        }
    }
}
