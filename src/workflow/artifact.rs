//! Artifacts from GitHub REST API.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents an artifact from GitHub REST API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub id: u64,
    pub name: String,
    pub size_in_bytes: u64,
    pub archive_download_url: String,
    /// Set by GitHub once the retention period has passed; an expired artifact cannot be downloaded.
    pub expired: bool,
    /// When the retention period ends.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// `sha256:<hex>`, for artifacts uploaded by recent versions of `actions/upload-artifact`.
    #[serde(default)]
    pub digest: Option<String>,
}

impl Artifact {
    /// Whether the artifact can still be downloaded.
    pub fn is_fresh(&self) -> bool {
        !self.expired
    }
}

impl Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} at {})",
            self.name, self.id, self.archive_download_url
        )
    }
}

/// Returns the hex part of a `sha256:<hex>` digest, if the digest uses that algorithm.
pub fn sha256_hex(digest: &str) -> Option<&str> {
    digest.strip_prefix("sha256:")
}
