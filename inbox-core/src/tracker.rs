//! Per-session file lifecycle tracking
//!
//! A close only counts as a completed upload when the path was written
//! since it was last settled. Each session owns one tracker; the transport
//! may dispatch a session's hooks on different workers, so the state lives
//! behind an async mutex.

use crate::descriptor::Operation;
use crate::processor::FileEventProcessor;
use crate::storage::canonical_path;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::sync::Mutex;

/// File lifecycle callbacks invoked by the file-transfer layer
///
/// Paths are session paths. `failure` carries the error of an operation the
/// transport attempted but could not complete.
#[async_trait]
pub trait FileEventHooks: Send + Sync {
    async fn session_started(&self);

    async fn written(&self, path: &str, failure: Option<&io::Error>);

    async fn closed(&self, path: &str);

    async fn removed(&self, path: &str, failure: Option<&io::Error>);

    async fn moved(&self, src: &str, dst: &str, failure: Option<&io::Error>);

    async fn directory_created(&self, path: &str, failure: Option<&io::Error>);

    async fn session_closed(&self);
}

/// Lifecycle tracker for one authenticated session
pub struct UploadEventTracker {
    user: String,
    processor: Arc<FileEventProcessor>,
    /// canonical path -> written since last settled
    modified: Mutex<HashMap<String, bool>>,
}

impl UploadEventTracker {
    pub fn new(user: &str, processor: Arc<FileEventProcessor>) -> Self {
        Self {
            user: user.to_string(),
            processor,
            modified: Mutex::new(HashMap::new()),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Whether `path` has unsettled writes
    pub async fn is_modified(&self, path: &str) -> bool {
        let modified = self.modified.lock().await;
        modified.get(&canonical_path(path)).copied().unwrap_or(false)
    }

    async fn settle(&self, path: &str) -> bool {
        self.modified.lock().await.remove(path).unwrap_or(false)
    }
}

#[async_trait]
impl FileEventHooks for UploadEventTracker {
    async fn session_started(&self) {
        tracing::info!("Session started for {}", self.user);
    }

    async fn written(&self, path: &str, failure: Option<&io::Error>) {
        if let Some(e) = failure {
            tracing::warn!("Write to {} by {} failed: {}", path, self.user, e);
            return;
        }
        self.modified.lock().await.insert(canonical_path(path), true);
    }

    async fn closed(&self, path: &str) {
        let path = canonical_path(path);
        if !self.settle(&path).await {
            return;
        }
        tracing::info!("Upload of {} by {} completed", path, self.user);
        self.processor.process(Operation::Upload, &self.user, None, &path).await;
    }

    async fn removed(&self, path: &str, failure: Option<&io::Error>) {
        if let Some(e) = failure {
            tracing::warn!("Removal of {} by {} failed: {}", path, self.user, e);
            return;
        }
        let path = canonical_path(path);
        self.settle(&path).await;
        self.processor.process(Operation::Remove, &self.user, None, &path).await;
    }

    async fn moved(&self, src: &str, dst: &str, failure: Option<&io::Error>) {
        if let Some(e) = failure {
            tracing::warn!("Move of {} to {} by {} failed: {}", src, dst, self.user, e);
            return;
        }
        let src = canonical_path(src);
        self.settle(&src).await;
        self.processor
            .process(Operation::Rename, &self.user, Some(&src), dst)
            .await;
    }

    async fn directory_created(&self, path: &str, failure: Option<&io::Error>) {
        match failure {
            Some(e) => tracing::warn!("Creating directory {} for {} failed: {}", path, self.user, e),
            None => tracing::debug!("Directory {} created by {}", path, self.user),
        }
    }

    async fn session_closed(&self) {
        let pending = self.modified.lock().await.len();
        if pending > 0 {
            tracing::warn!("Session of {} closed with {} unclosed written files", self.user, pending);
        }
        tracing::info!("Session closed for {}", self.user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumAlgorithm;
    use crate::descriptor::FileDescriptor;
    use crate::publish::{ChannelPublisher, Destination};
    use crate::storage::{LocalStorage, StorageBackend};
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn create_tracker() -> (TempDir, Arc<UploadEventTracker>, UnboundedReceiver<(Destination, FileDescriptor)>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageBackend::Local(LocalStorage::new(dir.path()).unwrap());
        storage.prepare("alice").await.unwrap();
        let (publisher, rx) = ChannelPublisher::new();
        let processor = FileEventProcessor::new(Arc::new(storage), Arc::new(publisher), ChecksumAlgorithm::Md5);
        let tracker = Arc::new(UploadEventTracker::new("alice", Arc::new(processor)));
        (dir, tracker, rx)
    }

    fn write_file(dir: &TempDir, name: &str, data: &[u8]) {
        std::fs::write(dir.path().join("alice").join(name), data).unwrap();
    }

    #[tokio::test]
    async fn test_write_then_close_emits_once() {
        let (dir, tracker, mut rx) = create_tracker().await;
        write_file(&dir, "data.raw", b"hello");

        tracker.written("/data.raw", None).await;
        assert!(tracker.is_modified("data.raw").await);
        tracker.closed("/data.raw").await;
        tracker.closed("/data.raw").await;

        let (dest, d) = rx.try_recv().unwrap();
        assert_eq!(dest, Destination::Files);
        assert_eq!(d.operation, Operation::Upload);
        assert!(rx.try_recv().is_err());
        assert!(!tracker.is_modified("/data.raw").await);
    }

    #[tokio::test]
    async fn test_read_only_close_emits_nothing() {
        let (dir, tracker, mut rx) = create_tracker().await;
        write_file(&dir, "data.raw", b"hello");

        tracker.session_started().await;
        tracker.closed("/data.raw").await;
        tracker.session_closed().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_write_does_not_mark() {
        let (dir, tracker, mut rx) = create_tracker().await;
        write_file(&dir, "data.raw", b"hello");

        let err = io::Error::other("disk full");
        tracker.written("/data.raw", Some(&err)).await;
        tracker.closed("/data.raw").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_write_on_one_worker_visible_to_close_on_another() {
        let (dir, tracker, mut rx) = create_tracker().await;
        write_file(&dir, "data.raw", b"hello");

        let writer = tracker.clone();
        tokio::spawn(async move { writer.written("/x/../data.raw", None).await })
            .await
            .unwrap();
        let closer = tracker.clone();
        tokio::spawn(async move { closer.closed("/data.raw").await })
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().1.file_size, Some(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_closes_emit_one_event() {
        let (dir, tracker, mut rx) = create_tracker().await;
        write_file(&dir, "data.raw", b"hello");
        tracker.written("/data.raw", None).await;

        let closes: Vec<_> = (0..8)
            .map(|_| {
                let t = tracker.clone();
                tokio::spawn(async move { t.closed("/data.raw").await })
            })
            .collect();
        for c in closes {
            c.await.unwrap();
        }

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_always_emits_and_clears_state() {
        let (_dir, tracker, mut rx) = create_tracker().await;

        tracker.written("/data.raw", None).await;
        tracker.removed("/data.raw", None).await;
        assert!(!tracker.is_modified("/data.raw").await);

        let (_, d) = rx.try_recv().unwrap();
        assert_eq!(d.operation, Operation::Remove);

        tracker.closed("/data.raw").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_remove_emits_nothing() {
        let (_dir, tracker, mut rx) = create_tracker().await;
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        tracker.removed("/data.raw", Some(&err)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rename_always_emits_with_old_path() {
        let (dir, tracker, mut rx) = create_tracker().await;
        write_file(&dir, "renamed.raw", b"hello");

        tracker.written("/data.raw", None).await;
        tracker.moved("/data.raw", "/renamed.raw", None).await;
        assert!(!tracker.is_modified("/data.raw").await);

        let (_, d) = rx.try_recv().unwrap();
        assert_eq!(d.operation, Operation::Rename);
        assert!(d.old_path.unwrap().ends_with("data.raw"));
        assert!(d.file_path.ends_with("renamed.raw"));
    }

    #[tokio::test]
    async fn test_directory_hooks_emit_nothing() {
        let (dir, tracker, mut rx) = create_tracker().await;
        std::fs::create_dir(dir.path().join("alice").join("run1")).unwrap();

        tracker.directory_created("/run1", None).await;
        assert!(rx.try_recv().is_err());
    }
}
