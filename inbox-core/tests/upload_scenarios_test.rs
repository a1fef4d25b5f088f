//! End-to-end upload scenarios
//!
//! A gateway is wired to the identity service double and a channel
//! publisher; the test plays the file-transfer layer by writing into the
//! session's home directory and firing the lifecycle hooks.

mod common;

use common::{SERVICE_PASSWORD, SERVICE_USER, ed25519_blob, random_user, rsa_blob, rsa_line, spawn_identity_service, IdentityService};
use inbox_core::storage::{LocalStorage, MemoryObjectClient, ObjectStorage};
use inbox_core::{
    ChannelPublisher, ChecksumAlgorithm, Destination, FileDescriptor, FileEventHooks, HttpCredentialSource,
    InboxConfig, InboxGateway, Integrity, Operation, StorageBackend, StorageRoot, TransportAuthenticator,
    UploadEventTracker,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

const PASSWORD: &str = "correct horse";
const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
const EXPONENT: &[u8] = &[0x01, 0x00, 0x01];
const MODULUS: &[u8] = &[0xc3; 64];

struct Harness {
    dir: TempDir,
    identity: IdentityService,
    gateway: InboxGateway,
    rx: UnboundedReceiver<(Destination, FileDescriptor)>,
    objects: Option<Arc<MemoryObjectClient>>,
    user: String,
}

async fn harness(object_store: bool) -> Harness {
    let user = random_user();
    let hash = bcrypt::hash(PASSWORD, 4).unwrap();
    let identity = spawn_identity_service(vec![(
        user.clone(),
        json!({"password_hash": hash, "pubkey": rsa_line(EXPONENT, MODULUS)}).to_string(),
    )])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let local = LocalStorage::new(dir.path()).unwrap();
    let (storage, objects) = if object_store {
        let client = Arc::new(MemoryObjectClient::new());
        (
            StorageBackend::ObjectStore(ObjectStorage::new(local, client.clone())),
            Some(client),
        )
    } else {
        (StorageBackend::Local(local), None)
    };

    let source =
        HttpCredentialSource::new(&identity.endpoint(), SERVICE_USER, SERVICE_PASSWORD, Duration::from_secs(5))
            .unwrap();
    let (publisher, rx) = ChannelPublisher::new();
    let gateway = InboxGateway::new(&InboxConfig::default(), Arc::new(source), storage, Arc::new(publisher));

    Harness {
        dir,
        identity,
        gateway,
        rx,
        objects,
        user,
    }
}

impl Harness {
    async fn login(&self) -> (StorageRoot, UploadEventTracker) {
        assert!(self.gateway.authenticate_password(&self.user, PASSWORD).await);
        let session = self.gateway.open_session(&self.user).await.unwrap();
        session.1.session_started().await;
        session
    }
}

async fn upload(root: &StorageRoot, tracker: &UploadEventTracker, path: &str, data: &[u8]) {
    let local = root.home.join(path.trim_start_matches('/'));
    tokio::fs::write(&local, data).await.unwrap();
    tracker.written(path, None).await;
    tracker.closed(path).await;
}

#[tokio::test]
async fn test_data_file_upload_publishes_to_files() {
    for object_store in [false, true] {
        let mut h = harness(object_store).await;
        let (root, tracker) = h.login().await;

        upload(&root, &tracker, "/data.raw", b"hello").await;

        let (dest, d) = h.rx.try_recv().unwrap();
        assert_eq!(dest, Destination::Files);
        assert_eq!(d.user, h.user);
        assert_eq!(d.operation, Operation::Upload);
        assert_eq!(d.file_size, Some(5));
        assert_eq!(d.content, None);
        assert_eq!(
            d.checksums,
            Some(vec![Integrity {
                algorithm: ChecksumAlgorithm::Md5,
                checksum: HELLO_MD5.to_string(),
            }])
        );

        let wire: serde_json::Value = serde_json::from_str(&d.to_json().unwrap()).unwrap();
        assert_eq!(wire["filesize"], 5);
        assert!(wire["content"].is_null());
        assert_eq!(wire["encrypted_integrity"][0]["algorithm"], "md5");
        assert_eq!(wire["encrypted_integrity"][0]["checksum"], HELLO_MD5);

        match &h.objects {
            Some(client) => {
                assert_eq!(d.file_path, "data.raw");
                assert_eq!(
                    client.object(&h.user, "data.raw").await.unwrap(),
                    bytes::Bytes::from_static(b"hello")
                );
            }
            None => assert_eq!(d.file_path, root.home.join("data.raw").to_string_lossy()),
        }
    }
}

#[tokio::test]
async fn test_sidecar_upload_publishes_content_to_checksums() {
    for object_store in [false, true] {
        let mut h = harness(object_store).await;
        let (root, tracker) = h.login().await;

        upload(&root, &tracker, "/data.md5", b"abcd1234").await;

        let (dest, d) = h.rx.try_recv().unwrap();
        assert_eq!(dest, Destination::Checksums);
        assert_eq!(d.content.as_deref(), Some("abcd1234"));
        assert_eq!(d.file_size, None);
        assert_eq!(d.checksums, None);
    }
}

#[tokio::test]
async fn test_rename_publishes_old_and_new_path() {
    for object_store in [false, true] {
        let mut h = harness(object_store).await;
        let (root, tracker) = h.login().await;
        upload(&root, &tracker, "/data.raw", b"hello").await;
        h.rx.try_recv().unwrap();

        tokio::fs::create_dir(root.home.join("archive")).await.unwrap();
        tracker.directory_created("/archive", None).await;
        tokio::fs::rename(root.home.join("data.raw"), root.home.join("archive/data.raw"))
            .await
            .unwrap();
        tracker.moved("/data.raw", "/archive/data.raw", None).await;

        let (dest, d) = h.rx.try_recv().unwrap();
        assert_eq!(dest, Destination::Files);
        assert_eq!(d.operation, Operation::Rename);
        assert!(d.old_path.as_deref().unwrap().ends_with("data.raw"));
        assert!(d.file_path.ends_with("archive/data.raw"));
        assert_eq!(d.checksums.unwrap()[0].checksum, HELLO_MD5);
        assert!(h.rx.try_recv().is_err());

        if let Some(client) = &h.objects {
            assert_eq!(client.keys(&h.user).await, vec!["archive/data.raw"]);
        }
    }
}

#[tokio::test]
async fn test_remove_publishes_bare_descriptor() {
    for object_store in [false, true] {
        let mut h = harness(object_store).await;
        let (root, tracker) = h.login().await;
        upload(&root, &tracker, "/data.raw", b"hello").await;
        h.rx.try_recv().unwrap();

        tokio::fs::remove_file(root.home.join("data.raw")).await.unwrap();
        tracker.removed("/data.raw", None).await;

        let (dest, d) = h.rx.try_recv().unwrap();
        assert_eq!(dest, Destination::Files);
        assert_eq!(d.operation, Operation::Remove);
        assert_eq!(d.file_size, None);
        assert_eq!(d.checksums, None);

        if let Some(client) = &h.objects {
            assert!(client.keys(&h.user).await.is_empty());
        }
    }
}

#[tokio::test]
async fn test_read_only_close_publishes_nothing() {
    for object_store in [false, true] {
        let mut h = harness(object_store).await;
        let (root, tracker) = h.login().await;
        tokio::fs::write(root.home.join("existing.raw"), b"hello").await.unwrap();

        tracker.closed("/existing.raw").await;
        tracker.session_closed().await;

        assert!(h.rx.try_recv().is_err());
        if let Some(client) = &h.objects {
            assert!(client.keys(&h.user).await.is_empty());
        }
    }
}

#[tokio::test]
async fn test_unsupported_public_key_is_rejected() {
    let h = harness(false).await;

    assert!(!h.gateway.authenticate_publickey(&h.user, &ed25519_blob()).await);
    assert!(h.gateway.open_session(&h.user).await.is_none());
    assert_eq!(h.identity.hits(), 0);
}

#[tokio::test]
async fn test_public_key_login_provisions_storage() {
    for object_store in [false, true] {
        let h = harness(object_store).await;

        assert!(h.gateway.authenticate_publickey(&h.user, &rsa_blob(EXPONENT, MODULUS)).await);
        let (root, _) = h.gateway.open_session(&h.user).await.unwrap();
        assert_eq!(root.home, h.dir.path().join(&h.user));
        assert!(root.home.is_dir());

        if let Some(client) = &h.objects {
            assert_eq!(root.bucket.as_deref(), Some(h.user.as_str()));
            assert_eq!(client.bucket_creations(), 1);
        }
    }
}

#[tokio::test]
async fn test_failed_logins_do_not_open_sessions() {
    let h = harness(false).await;

    assert!(!h.gateway.authenticate_password(&h.user, "wrong").await);
    assert!(!h.gateway.authenticate_password("nobody", PASSWORD).await);
    assert!(!h.gateway.authenticate_publickey(&h.user, &rsa_blob(EXPONENT, &[0x11; 64])).await);
    assert!(h.gateway.open_session(&h.user).await.is_none());
    assert!(!h.dir.path().join(&h.user).exists());
}

#[tokio::test]
async fn test_repeated_logins_hit_identity_service_once() {
    let h = harness(true).await;

    for _ in 0..3 {
        h.login().await;
    }
    assert!(!h.gateway.authenticate_password(&h.user, "wrong").await);

    assert_eq!(h.identity.hits(), 1);
    assert_eq!(h.objects.as_ref().unwrap().bucket_creations(), 1);
}

#[tokio::test]
async fn test_sessions_of_one_user_are_independent() {
    let mut h = harness(false).await;
    let (root, first) = h.login().await;
    let (_, second) = h.login().await;

    tokio::fs::write(root.home.join("data.raw"), b"hello").await.unwrap();
    first.written("/data.raw", None).await;
    second.closed("/data.raw").await;
    assert!(h.rx.try_recv().is_err());

    first.closed("/data.raw").await;
    assert!(h.rx.try_recv().is_ok());
}
