//! SSH public key parsing and comparison
//!
//! Keys arrive as `"<algorithm> <base64-blob> [comment]"` lines from the
//! identity service, or as raw wire blobs from the transport during login.
//! The blob is a sequence of 32-bit big-endian length-prefixed fields
//! (RFC 4253, section 6.6). Only `ssh-rsa` and `ssh-dss` are decoded.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use num_bigint::BigInt;

pub const RSA_ALGORITHM: &str = "ssh-rsa";
pub const DSS_ALGORITHM: &str = "ssh-dss";

/// Algorithm identifiers known to the system but not decoded here
pub const RECOGNIZED_ALGORITHMS: &[&str] = &[
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
];

/// Errors raised while decoding a public key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Unsupported key format: {0}")]
    UnsupportedKeyFormat(String),

    #[error("Malformed key: {0}")]
    MalformedKey(String),
}

/// Decoded public key
///
/// Equality is structural over the numeric components, so two encodings
/// of the same key compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa { exponent: BigInt, modulus: BigInt },
    Dss { p: BigInt, q: BigInt, g: BigInt, y: BigInt },
}

impl PublicKey {
    /// Parse an authorized-keys style line.
    pub fn parse(line: &str) -> Result<Self, KeyError> {
        let mut parts = line.split_whitespace();
        let declared = parts
            .next()
            .ok_or_else(|| KeyError::MalformedKey("empty key line".to_string()))?;

        if declared != RSA_ALGORITHM && declared != DSS_ALGORITHM {
            return Err(KeyError::UnsupportedKeyFormat(declared.to_string()));
        }

        let blob = parts
            .next()
            .ok_or_else(|| KeyError::MalformedKey("missing key data".to_string()))?;
        let bytes = B64
            .decode(blob)
            .map_err(|e| KeyError::MalformedKey(format!("invalid base64: {}", e)))?;

        let key = Self::parse_blob(&bytes)?;
        if key.algorithm() != declared {
            return Err(KeyError::UnsupportedKeyFormat(key.algorithm().to_string()));
        }
        Ok(key)
    }

    /// Parse a raw wire-format key blob.
    pub fn parse_blob(bytes: &[u8]) -> Result<Self, KeyError> {
        let mut reader = WireReader::new(bytes);
        let name = reader.read_field()?;
        let name = std::str::from_utf8(name)
            .map_err(|_| KeyError::MalformedKey("algorithm name is not UTF-8".to_string()))?;

        match name {
            RSA_ALGORITHM => Ok(PublicKey::Rsa {
                exponent: reader.read_mpint()?,
                modulus: reader.read_mpint()?,
            }),
            DSS_ALGORITHM => Ok(PublicKey::Dss {
                p: reader.read_mpint()?,
                q: reader.read_mpint()?,
                g: reader.read_mpint()?,
                y: reader.read_mpint()?,
            }),
            other => Err(KeyError::UnsupportedKeyFormat(other.to_string())),
        }
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            PublicKey::Rsa { .. } => RSA_ALGORITHM,
            PublicKey::Dss { .. } => DSS_ALGORITHM,
        }
    }

    /// Size of the key in bits (modulus for RSA, p for DSS)
    pub fn bits(&self) -> u64 {
        match self {
            PublicKey::Rsa { modulus, .. } => modulus.bits(),
            PublicKey::Dss { p, .. } => p.bits(),
        }
    }
}

/// Structural key comparison
pub fn equals(a: &PublicKey, b: &PublicKey) -> bool {
    a == b
}

/// Whether `name` is a key algorithm the system knows about at all
pub fn is_recognized_algorithm(name: &str) -> bool {
    name == RSA_ALGORITHM || name == DSS_ALGORITHM || RECOGNIZED_ALGORITHMS.contains(&name)
}

struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn read_field(&mut self) -> Result<&'a [u8], KeyError> {
        if self.buf.len() < 4 {
            return Err(KeyError::MalformedKey(format!(
                "truncated length prefix ({} bytes left)",
                self.buf.len()
            )));
        }
        let (len_bytes, rest) = self.buf.split_at(4);
        let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        if len > rest.len() {
            return Err(KeyError::MalformedKey(format!(
                "field length {} exceeds remaining {} bytes",
                len,
                rest.len()
            )));
        }
        let (field, rest) = rest.split_at(len);
        self.buf = rest;
        Ok(field)
    }

    fn read_mpint(&mut self) -> Result<BigInt, KeyError> {
        Ok(BigInt::from_signed_bytes_be(self.read_field()?))
    }
}
