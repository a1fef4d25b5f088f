//! Inbox configuration
//!
//! Loaded from a TOML file. Every section has defaults so a minimal file
//! only needs the identity-service endpoint and credentials:
//!
//! ```toml
//! [identity]
//! endpoint = "https://cega.example.org/lega/v1/legas/users"
//! username = "lega"
//! password = "secret"
//!
//! [storage]
//! backend = "local"
//! root = "/ega/inbox"
//!
//! [events]
//! checksum_algorithm = "md5"
//! ```

use crate::checksum::ChecksumAlgorithm;
use crate::publish::Destination;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub storage: StorageConfig,
    pub events: EventsConfig,
}

/// Settings handed to the transport library
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen port of the file-transfer service
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 2222 }
    }
}

/// Identity service and credential cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Base URL; the username is appended as the last path segment
    pub endpoint: String,
    /// HTTP Basic user for the identity service
    pub username: String,
    /// HTTP Basic password for the identity service
    pub password: String,
    pub timeout_secs: u64,
    /// Cache lifetime for records without their own expiration
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8443/username".to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: 10,
            cache_ttl_secs: 3600,
            cache_capacity: 10_000,
        }
    }
}

impl IdentityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Which storage backend receives uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    S3,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Parent of the per-user home directories (the staging area for S3)
    pub root: PathBuf,
    pub s3: S3Config,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            root: PathBuf::from("/ega/inbox"),
            s3: S3Config::default(),
        }
    }
}

/// S3-compatible object store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
        }
    }
}

/// Event publishing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub exchange: String,
    pub routing_key_checksums: String,
    pub routing_key_files: String,
    /// Digest computed for regular uploads
    pub checksum_algorithm: ChecksumAlgorithm,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            exchange: "lega".to_string(),
            routing_key_checksums: "files.inbox.checksums".to_string(),
            routing_key_files: "files.inbox".to_string(),
            checksum_algorithm: ChecksumAlgorithm::Md5,
        }
    }
}

impl EventsConfig {
    /// Routing key for a logical destination
    pub fn routing_key(&self, destination: Destination) -> &str {
        match destination {
            Destination::Checksums => &self.routing_key_checksums,
            Destination::Files => &self.routing_key_files,
        }
    }
}

impl InboxConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&data)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        let config: InboxConfig = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = &self.identity.endpoint;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "identity.endpoint must be an http(s) URL, got {:?}",
                endpoint
            )));
        }
        if self.identity.cache_capacity == 0 {
            return Err(ConfigError::Invalid("identity.cache_capacity must be positive".to_string()));
        }
        if self.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.root must not be empty".to_string()));
        }
        if self.storage.backend == BackendKind::S3 {
            let s3 = &self.storage.s3;
            if s3.endpoint.is_empty() || s3.access_key.is_empty() || s3.secret_key.is_empty() {
                return Err(ConfigError::Invalid(
                    "storage.s3 requires endpoint, access_key and secret_key".to_string(),
                ));
            }
        }
        if self.events.routing_key_checksums.is_empty() || self.events.routing_key_files.is_empty() {
            return Err(ConfigError::Invalid("events routing keys must not be empty".to_string()));
        }
        Ok(())
    }
}
