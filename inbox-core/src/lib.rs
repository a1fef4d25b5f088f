//! Inbox Core Library
//!
//! Authentication and event subsystem of the file-ingestion inbox:
//! - Credential lookup with a TTL-bounded, single-flight cache
//! - Password (bcrypt and crypt family) and SSH public key verification
//! - Storage backends (local filesystem, S3-compatible object store)
//! - Per-session upload tracking
//! - File event descriptors and publishing

pub mod auth;
pub mod checksum;
pub mod config;
pub mod credentials;
pub mod descriptor;
pub mod gateway;
pub mod password;
pub mod processor;
pub mod publish;
pub mod pubkey;
pub mod storage;
pub mod tracker;

pub use auth::{SessionAuthenticator, TransportAuthenticator};
pub use checksum::ChecksumAlgorithm;
pub use config::{BackendKind, ConfigError, InboxConfig};
pub use credentials::{CredentialRecord, CredentialSource, CredentialStore, HttpCredentialSource, LookupError};
pub use descriptor::{FileDescriptor, Integrity, Operation};
pub use gateway::InboxGateway;
pub use password::HashScheme;
pub use processor::FileEventProcessor;
pub use publish::{ChannelPublisher, Destination, EventPublisher, LogPublisher, PublishError};
pub use pubkey::{KeyError, PublicKey};
pub use storage::{StorageBackend, StorageError, StorageRoot};
pub use tracker::{FileEventHooks, UploadEventTracker};
