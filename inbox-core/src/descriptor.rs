//! Messages published for downstream processing

use crate::checksum::ChecksumAlgorithm;
use serde::{Deserialize, Serialize};

/// File operation that triggered an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Rename,
    Remove,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Upload => "upload",
            Operation::Rename => "rename",
            Operation::Remove => "remove",
        })
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upload" => Ok(Operation::Upload),
            "rename" | "move" => Ok(Operation::Rename),
            "remove" | "delete" => Ok(Operation::Remove),
            _ => Err(format!("Unknown operation: {}", s)),
        }
    }
}

/// One digest of a file's contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    pub algorithm: ChecksumAlgorithm,
    pub checksum: String,
}

/// Event describing a completed upload, rename or removal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub user: String,

    #[serde(rename = "filepath")]
    pub file_path: String,

    #[serde(rename = "old_path", default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,

    pub operation: Operation,

    #[serde(rename = "filesize")]
    pub file_size: Option<u64>,

    /// Seconds since the Unix epoch
    #[serde(rename = "file_last_modified")]
    pub last_modified: Option<i64>,

    #[serde(rename = "encrypted_integrity")]
    pub checksums: Option<Vec<Integrity>>,

    /// Verbatim text of a sidecar checksum file
    pub content: Option<String>,
}

impl FileDescriptor {
    /// Descriptor with only the mandatory fields set
    pub fn new(user: &str, file_path: String, operation: Operation) -> Self {
        Self {
            user: user.to_string(),
            file_path,
            old_path: None,
            operation,
            file_size: None,
            last_modified: None,
            checksums: None,
            content: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
