//! Startup wiring
//!
//! `InboxGateway` is what the file-transfer service embeds: it answers the
//! login callbacks and hands out a lifecycle tracker for every session of
//! an authenticated user.

use crate::auth::{SessionAuthenticator, TransportAuthenticator};
use crate::config::InboxConfig;
use crate::credentials::{CredentialSource, CredentialStore, HttpCredentialSource};
use crate::processor::FileEventProcessor;
use crate::publish::EventPublisher;
use crate::storage::{StorageBackend, StorageRoot};
use crate::tracker::UploadEventTracker;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub struct InboxGateway {
    authenticator: SessionAuthenticator,
    processor: Arc<FileEventProcessor>,
}

impl InboxGateway {
    /// Build a gateway backed by the identity service and storage named in
    /// `config`.
    pub async fn from_config(config: &InboxConfig, publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        let identity = &config.identity;
        let source = HttpCredentialSource::new(
            &identity.endpoint,
            &identity.username,
            &identity.password,
            identity.timeout(),
        )
        .context("Failed to create identity service client")?;

        let storage = StorageBackend::from_config(&config.storage)
            .await
            .with_context(|| format!("Failed to open storage at {:?}", config.storage.root))?;

        tracing::info!(
            "Inbox gateway using {} storage at {:?}, identity service {}",
            storage.kind(),
            config.storage.root,
            identity.endpoint
        );

        Ok(Self::new(config, Arc::new(source), storage, publisher))
    }

    /// Assemble a gateway from already constructed collaborators.
    pub fn new(
        config: &InboxConfig,
        source: Arc<dyn CredentialSource>,
        storage: StorageBackend,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let store = CredentialStore::new(
            source,
            config.identity.cache_ttl(),
            config.identity.cache_capacity,
        );
        let storage = Arc::new(storage);
        let processor = FileEventProcessor::new(storage.clone(), publisher, config.events.checksum_algorithm);

        Self {
            authenticator: SessionAuthenticator::new(Arc::new(store), storage),
            processor: Arc::new(processor),
        }
    }

    pub fn authenticator(&self) -> &SessionAuthenticator {
        &self.authenticator
    }

    pub fn processor(&self) -> &Arc<FileEventProcessor> {
        &self.processor
    }

    /// Open the lifecycle tracker for a new session of `username`.
    ///
    /// Returns `None` unless the user has authenticated and their storage
    /// root is bound.
    pub async fn open_session(&self, username: &str) -> Option<(StorageRoot, UploadEventTracker)> {
        let root = self.authenticator.storage_root(username).await?;
        Some((root, UploadEventTracker::new(username, self.processor.clone())))
    }
}

#[async_trait]
impl TransportAuthenticator for InboxGateway {
    async fn authenticate_password(&self, username: &str, password: &str) -> bool {
        self.authenticator.authenticate_password(username, password).await
    }

    async fn authenticate_publickey(&self, username: &str, key_bytes: &[u8]) -> bool {
        self.authenticator.authenticate_publickey(username, key_bytes).await
    }
}
