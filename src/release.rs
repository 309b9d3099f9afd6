//! Releases, and the choice of the release published at the site root.

use std::pin::pin;

use futures::{Stream, TryStreamExt as _};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;

/// The content type of a zipped web build attached to a release.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Represents a release from GitHub REST API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub id: u64,
    pub name: Option<String>,
    pub tag_name: String,
    pub html_url: String,
    pub draft: bool,
    pub prerelease: bool,
    pub published_at: Option<String>,
    pub assets: Vec<ReleaseAsset>,
}

/// Represents a file attached to a release.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub id: u64,
    pub name: String,
    pub content_type: String,
    /// The API url of the asset; downloading it needs `Accept: application/octet-stream`.
    pub url: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub digest: Option<String>,
}

/// A release together with its web build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub data: ReleaseInfo,
    pub asset: ReleaseAsset,
}

impl Release {
    /// The name to display for the release, falling back to its tag.
    pub fn display_name(&self) -> &str {
        self.data.name.as_deref().filter(|name| !name.is_empty()).unwrap_or(&self.data.tag_name)
    }
}

/// Finds the newest non-draft release carrying a `*-<artifact_name>.zip` archive.
///
/// `releases` must be ordered newest-first, as GitHub lists them. Pre-releases count, since
/// the "latest release" endpoint cannot return them.
///
/// # Errors
///
/// Returns the first [`ApiError`] from the stream.
pub async fn select_latest<S>(releases: S, artifact_name: &str) -> Result<Option<Release>, ApiError>
where
    S: Stream<Item = Result<ReleaseInfo, ApiError>>,
{
    let name_suffix = format!("-{artifact_name}.zip");
    info!("finding latest release with an asset whose name ends with '{name_suffix}'…");

    let mut releases = pin!(releases);
    while let Some(release) = releases.try_next().await? {
        if release.draft {
            continue;
        }

        let asset = release.assets.iter().find(|asset| {
            asset.name.ends_with(&name_suffix) && asset.content_type == ARCHIVE_CONTENT_TYPE
        });
        if let Some(asset) = asset.cloned() {
            info!("found suitable asset {} in release {}", asset.name, release.tag_name);
            return Ok(Some(Release {
                data: release,
                asset,
            }));
        }
    }

    info!("no suitable release/asset found");
    Ok(None)
}
