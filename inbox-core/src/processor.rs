//! Turning completed file operations into published descriptors
//!
//! Routing follows the target's extension: sidecar checksum files
//! (`.md5`, `.sha256`) carry their text verbatim and go to the checksums
//! destination; everything else carries size, modification time and a
//! freshly computed digest and goes to the files destination.

use crate::checksum::ChecksumAlgorithm;
use crate::descriptor::{FileDescriptor, Integrity, Operation};
use crate::publish::{Destination, EventPublisher};
use crate::storage::{canonical_path, StorageBackend};
use std::path::Path;
use std::sync::Arc;

/// Builds and publishes descriptors for one deployment
pub struct FileEventProcessor {
    storage: Arc<StorageBackend>,
    publisher: Arc<dyn EventPublisher>,
    checksum: ChecksumAlgorithm,
}

/// Destination a session path is routed to
pub fn destination_of(path: &str) -> Destination {
    match sidecar_algorithm(path) {
        Some(_) => Destination::Checksums,
        None => Destination::Files,
    }
}

fn sidecar_algorithm(path: &str) -> Option<ChecksumAlgorithm> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ChecksumAlgorithm::from_extension)
}

impl FileEventProcessor {
    pub fn new(
        storage: Arc<StorageBackend>,
        publisher: Arc<dyn EventPublisher>,
        checksum: ChecksumAlgorithm,
    ) -> Self {
        Self {
            storage,
            publisher,
            checksum,
        }
    }

    pub fn storage(&self) -> &Arc<StorageBackend> {
        &self.storage
    }

    /// Mirror `operation` into storage and publish its descriptor.
    ///
    /// `target` and `old_path` are session paths. Returns what was handed
    /// to the publisher, or `None` when there was nothing to describe (the
    /// target vanished or is a directory). Storage and publish failures are
    /// logged, never returned.
    pub async fn process(
        &self,
        operation: Operation,
        user: &str,
        old_path: Option<&str>,
        target: &str,
    ) -> Option<(Destination, FileDescriptor)> {
        let target = canonical_path(target);
        let local = self.storage.local_path(user, &target);
        tracing::debug!("Processing {} of {} for {}", operation, target, user);

        let old_path = match operation {
            Operation::Upload => {
                if !is_regular_file(&local).await {
                    tracing::debug!("{} is gone or not a file, nothing to upload", target);
                    return None;
                }
                let key = self.storage.key_of(&target);
                if let Err(e) = self.storage.upload(user, &key, &local, true).await {
                    tracing::error!("Upload of {} for {} failed: {}", target, user, e);
                }
                None
            }
            Operation::Rename => {
                let Some(src) = old_path.map(canonical_path) else {
                    tracing::warn!("Rename of {} for {} has no source path", target, user);
                    return None;
                };
                if let Err(e) = self.storage.move_entry(user, &src, &target).await {
                    tracing::error!("Move of {} to {} for {} failed: {}", src, target, user, e);
                }
                if !is_regular_file(&local).await {
                    tracing::debug!("{} is gone or not a file, no rename event", target);
                    return None;
                }
                Some(src)
            }
            Operation::Remove => {
                if let Err(e) = self.storage.remove(user, &target).await {
                    tracing::error!("Removal of {} for {} failed: {}", target, user, e);
                }
                None
            }
        };

        let destination = destination_of(&target);
        let mut descriptor = FileDescriptor::new(user, self.storage.descriptor_path(user, &target), operation);
        descriptor.old_path = old_path.map(|src| self.storage.descriptor_path(user, &src));

        if operation != Operation::Remove {
            let described = match destination {
                Destination::Checksums => self.describe_sidecar(&local, &mut descriptor).await,
                Destination::Files => self.describe_data(&local, &mut descriptor).await,
            };
            if let Err(e) = described {
                tracing::warn!("Could not describe {} for {}: {}", target, user, e);
                return None;
            }
        }

        if let Err(e) = self.publisher.publish(destination, &descriptor).await {
            tracing::error!("Failed to publish {} event for {}: {}", operation, target, e);
        } else {
            tracing::info!("Published {} event for {} to {}", operation, target, destination);
        }
        Some((destination, descriptor))
    }

    async fn describe_sidecar(&self, local: &Path, descriptor: &mut FileDescriptor) -> std::io::Result<()> {
        descriptor.content = Some(tokio::fs::read_to_string(local).await?);
        Ok(())
    }

    async fn describe_data(&self, local: &Path, descriptor: &mut FileDescriptor) -> std::io::Result<()> {
        let metadata = tokio::fs::metadata(local).await?;
        descriptor.file_size = Some(metadata.len());
        descriptor.last_modified = metadata
            .modified()
            .ok()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp());
        descriptor.checksums = Some(vec![Integrity {
            algorithm: self.checksum,
            checksum: self.checksum.digest_file(local).await?,
        }]);
        Ok(())
    }
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
