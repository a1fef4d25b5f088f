//! Credential retrieval for inbox users
//!
//! Credentials live in an external identity service and are fetched on demand:
//! - `CredentialSource` abstracts the backing lookup
//! - `HttpCredentialSource` queries the identity service over HTTP Basic auth
//! - `CredentialStore` caches records with a per-record TTL and collapses
//!   concurrent lookups for the same user into a single fetch

use crate::storage::is_valid_username;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Errors raised while looking up a user's credentials
///
/// Cloneable so that every caller waiting on a shared fetch receives the
/// same error value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    #[error("identity service unreachable: {0}")]
    Unreachable(String),

    #[error("identity service returned status {status} for user {username}")]
    Status { username: String, status: u16 },

    #[error("malformed credentials for user {username}: {reason}")]
    Decode { username: String, reason: String },
    #[error("invalid user name {0:?}")]
    InvalidUsername(String),
}

/// Credentials of a single user as returned by the identity service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CredentialRecord {
    #[serde(rename = "password_hash", alias = "passwordHash", default)]
    pub password_hash: String,

    /// Public key in `"<algorithm> <base64-blob> [comment]"` form
    #[serde(rename = "pubkey", alias = "sshPublicKey", default)]
    pub public_key: String,

    /// Record-specific cache lifetime in seconds
    #[serde(default)]
    pub expiration: Option<f64>,
}

impl CredentialRecord {
    /// Cache lifetime for this record, falling back to `default_ttl`.
    pub fn ttl(&self, default_ttl: Duration) -> Duration {
        self.expiration
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(default_ttl)
    }

    /// Decode an identity-service response body.
    ///
    /// Accepts the flat record as well as the older
    /// `{"response": {"result": [...]}}` envelope.
    pub fn from_json(username: &str, body: &[u8]) -> Result<Self, LookupError> {
        #[derive(Deserialize)]
        struct Results {
            result: Vec<CredentialRecord>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Body {
            Wrapped { response: Results },
            Flat(CredentialRecord),
        }

        let decode_err = |reason: String| LookupError::Decode {
            username: username.to_string(),
            reason,
        };

        let record = match serde_json::from_slice::<Body>(body) {
            Ok(Body::Flat(record)) => record,
            Ok(Body::Wrapped { response }) => response
                .result
                .into_iter()
                .next()
                .ok_or_else(|| decode_err("empty result list".to_string()))?,
            Err(e) => return Err(decode_err(e.to_string())),
        };

        if record.password_hash.is_empty() && record.public_key.is_empty() {
            return Err(decode_err("neither password hash nor public key present".to_string()));
        }

        Ok(record)
    }
}

/// Backing lookup used by [`CredentialStore`]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch the credentials of `username` from the system of record
    async fn fetch(&self, username: &str) -> Result<CredentialRecord, LookupError>;
}

/// Identity service client
///
/// Issues `GET <endpoint>/<username>` with HTTP Basic authentication.
pub struct HttpCredentialSource {
    endpoint: reqwest::Url,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl HttpCredentialSource {
    /// Create a client for `endpoint` using the given service credentials.
    pub fn new(
        endpoint: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Unreachable(format!("failed to build HTTP client: {}", e)))?;

        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| LookupError::Unreachable(format!("invalid endpoint {}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(LookupError::Unreachable(format!("endpoint {} cannot take a path", endpoint)));
        }

        Ok(Self {
            endpoint,
            username: username.to_string(),
            password: password.to_string(),
            http,
        })
    }

    /// Endpoint with `username` appended as one percent-encoded segment
    fn url_for(&self, username: &str) -> reqwest::Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(username);
        }
        url
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fetch(&self, username: &str) -> Result<CredentialRecord, LookupError> {
        if !is_valid_username(username) {
            return Err(LookupError::InvalidUsername(username.to_string()));
        }
        let url = self.url_for(username);
        let resp = self
            .http
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| LookupError::Unreachable(format!("GET {} failed: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LookupError::Status {
                username: username.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| LookupError::Unreachable(format!("failed to read body from {}: {}", url, e)))?;

        CredentialRecord::from_json(username, &body)
    }
}

/// Expiry policy: the deadline is fixed when the entry is created
struct RecordExpiry {
    default_ttl: Duration,
}

impl Expiry<String, CredentialRecord> for RecordExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CredentialRecord,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl(self.default_ttl))
    }
}

/// TTL-bounded, single-flight credential cache
pub struct CredentialStore {
    source: Arc<dyn CredentialSource>,
    cache: Cache<String, CredentialRecord>,
}

impl CredentialStore {
    /// Create a store over `source` with the given default TTL and capacity.
    pub fn new(source: Arc<dyn CredentialSource>, default_ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(RecordExpiry { default_ttl })
            .build();

        Self { source, cache }
    }

    /// Return the credentials of `username`, fetching them if absent or expired.
    ///
    /// Concurrent calls for the same user share one fetch and its outcome.
    /// Failed fetches are not cached.
    pub async fn get(&self, username: &str) -> Result<CredentialRecord, LookupError> {
        self.cache
            .try_get_with(username.to_string(), self.source.fetch(username))
            .await
            .map_err(|e| (*e).clone())
    }

    /// Drop any cached record for `username`.
    pub async fn invalidate(&self, username: &str) {
        self.cache.invalidate(username).await;
    }
}
