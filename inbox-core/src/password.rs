//! Password verification against stored hashes
//!
//! Supported formats:
//! - bcrypt (`$2a$`, `$2b$`, `$2y$`), verified with its embedded salt
//! - MD5-crypt (`$1$`), SHA-256-crypt (`$5$`), SHA-512-crypt (`$6$`)
//! - traditional DES crypt (13 characters, two-character salt)
//!
//! Crypt-family hashes are verified by recomputing the hash of the
//! candidate password with the stored salt and comparing the results.

/// Password hashing scheme, as identified by the hash prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    Bcrypt,
    Md5Crypt,
    Sha256Crypt,
    Sha512Crypt,
    DesCrypt,
}

impl HashScheme {
    /// Identify the scheme of `hash`, or `None` for unknown markers.
    pub fn detect(hash: &str) -> Option<Self> {
        if hash.starts_with("$2") {
            Some(HashScheme::Bcrypt)
        } else if hash.starts_with("$1$") {
            Some(HashScheme::Md5Crypt)
        } else if hash.starts_with("$5$") {
            Some(HashScheme::Sha256Crypt)
        } else if hash.starts_with("$6$") {
            Some(HashScheme::Sha512Crypt)
        } else if hash.len() == 13 && hash.bytes().all(is_crypt64) {
            Some(HashScheme::DesCrypt)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashScheme::Bcrypt => "bcrypt",
            HashScheme::Md5Crypt => "md5-crypt",
            HashScheme::Sha256Crypt => "sha256-crypt",
            HashScheme::Sha512Crypt => "sha512-crypt",
            HashScheme::DesCrypt => "des-crypt",
        }
    }
}

fn is_crypt64(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'/'
}

/// Extract the salt setting of a modular-crypt hash.
///
/// `$id$salt$digest` yields `$id$salt$`; `$id$rounds=N$salt$digest`
/// yields `$id$rounds=N$salt$`.
fn modular_setting(hash: &str) -> Option<&str> {
    let dollars: Vec<usize> = hash.match_indices('$').map(|(i, _)| i).collect();
    if dollars.len() < 3 || dollars[0] != 0 {
        return None;
    }

    let has_rounds = hash[dollars[1] + 1..].starts_with("rounds=");
    let end = if has_rounds { dollars.get(3)? } else { &dollars[2] };
    Some(&hash[..=*end])
}

/// Recompute the hash of `plaintext` with the salt of `stored_hash`.
fn recompute(scheme: HashScheme, plaintext: &str, stored_hash: &str) -> Option<String> {
    let result = match scheme {
        HashScheme::Md5Crypt => pwhash::md5_crypt::hash_with(modular_setting(stored_hash)?, plaintext),
        HashScheme::Sha256Crypt => {
            pwhash::sha256_crypt::hash_with(modular_setting(stored_hash)?, plaintext)
        }
        HashScheme::Sha512Crypt => {
            pwhash::sha512_crypt::hash_with(modular_setting(stored_hash)?, plaintext)
        }
        HashScheme::DesCrypt => pwhash::unix_crypt::hash_with(&stored_hash[..2], plaintext),
        HashScheme::Bcrypt => return None,
    };

    match result {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::debug!("Failed to recompute {} hash: {}", scheme.name(), e);
            None
        }
    }
}

/// Verify `plaintext` against `stored_hash`.
///
/// Never fails: unknown or malformed hashes simply do not match.
pub fn verify(plaintext: &str, stored_hash: &str) -> bool {
    let Some(scheme) = HashScheme::detect(stored_hash) else {
        tracing::debug!("Unsupported password hash format");
        return false;
    };

    if scheme == HashScheme::Bcrypt {
        return match bcrypt::verify(plaintext, stored_hash) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::debug!("bcrypt verification error: {}", e);
                false
            }
        };
    }

    recompute(scheme, plaintext, stored_hash)
        .map(|computed| computed.as_bytes() == stored_hash.as_bytes())
        .unwrap_or(false)
}
