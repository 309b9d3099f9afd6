use std::fmt::Display;

use futures::Stream;
use reqwest::{Method, Response, StatusCode};
use tokio_util::bytes::Bytes;
use tracing::{debug, error, info};

use crate::{
    framework::{StateError, StateResult},
    github::{GITHUB_JSON, GitHubApi},
    release::ReleaseAsset,
    workflow::artifact::Artifact,
};

/// A zip archive to download: a workflow artifact or a release asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    /// The name to log the archive by.
    pub name: String,
    /// The API url the archive is downloaded from.
    pub url: String,
    /// The media type to request. Release assets only serve their content for `application/octet-stream`.
    pub accept: &'static str,
    /// `sha256:<hex>`, when the API provides one.
    pub digest: Option<String>,
}

impl From<&Artifact> for Archive {
    fn from(artifact: &Artifact) -> Self {
        Self {
            name: artifact.name.clone(),
            url: artifact.archive_download_url.clone(),
            accept: GITHUB_JSON,
            digest: artifact.digest.clone(),
        }
    }
}

impl From<&ReleaseAsset> for Archive {
    fn from(asset: &ReleaseAsset) -> Self {
        Self {
            name: asset.name.clone(),
            url: asset.url.clone(),
            accept: "application/octet-stream",
            digest: asset.digest.clone(),
        }
    }
}

impl Display for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at {})", self.name, self.url)
    }
}

/// Downloads the specified archive from GitHub.
///
/// # Errors
///
/// Returns an error that instructs retrying or cancelling if downloading the archive fails.
pub async fn download_archive(
    api: &GitHubApi,
    archive: &Archive,
) -> StateResult<impl Stream<Item = Result<Bytes, reqwest::Error>> + use<>> {
    debug!("requesting download from {}…", &archive.url);

    match api
        .request_accepting(Method::GET, &archive.url, archive.accept)
        .send()
        .await
        .and_then(Response::error_for_status)
    {
        Ok(resp) => {
            let stream = resp.bytes_stream();
            info!("requested download from {}", archive.url);
            Ok(stream)
        }
        Err(err) => match err.status() {
            Some(StatusCode::GONE) => {
                error!("failed to request download: {archive} expired or removed");
                Err(StateError::Cancelled)
            }
            Some(status) => {
                if let Some(reason) = status.canonical_reason() {
                    error!(
                        "failed to request download from {}: {} {reason}",
                        &archive.url,
                        status.as_u16()
                    );
                } else {
                    error!(
                        "failed to request download from {}: {}",
                        &archive.url,
                        status.as_u16()
                    );
                }
                Err(classify(status))
            }
            None => {
                error!("failed to download archive at {}: {err}", &archive.url);
                Err(StateError::Retry)
            }
        },
    }
}

/// Client errors will not go away by asking again, except for throttling.
fn classify(status: StatusCode) -> StateError {
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => StateError::Retry,
        status if status.is_client_error() => StateError::Cancelled,
        _ => StateError::Retry,
    }
}
