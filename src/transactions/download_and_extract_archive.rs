use std::{fmt::Debug, path::Path};

use crate::{
    framework::{StateError, StateResult, run_transaction},
    github::GitHubApi,
    transactions::{Archive, download_archive, extract_archive},
    workflow::artifact::sha256_hex,
};

use anyhow::{Error, anyhow};
use async_zip::base::read::stream::ZipFileReader;
use futures::{AsyncReadExt as _, Stream, TryStreamExt as _};

use sha2::Digest as _;
use tokio_util::bytes::Bytes;
use tracing::{error, info, warn};

#[derive(Debug)]
enum Case {
    Extracted,
    Failed(Error),
    HashUnmatch,
}

/// Downloads an [`Archive`] and extracts it to a specified path, retrying transient failures.
///
/// See: [`download_and_extract_archive`]
///
/// # Errors
///
/// Returns [`StateError::Cancelled`] if the archive is gone or broken, or retrying did not help.
pub async fn fetch_archive<P>(api: &GitHubApi, archive: &Archive, path: P) -> StateResult<()>
where
    P: AsRef<Path> + Send + Sync + Debug,
{
    run_transaction(archive, api.max_retries(), || {
        download_and_extract_archive(api, archive, &path)
    })
    .await
}

/// Downloads an [`Archive`] and extracts the downloaded archive to a specified path.
///
/// See: [`download_archive`], [`extract_archive`]
///
/// # Errors
///
/// Returns an error that instructs retrying or cancelling if downloading or extracting fails.
pub async fn download_and_extract_archive<P>(
    api: &GitHubApi,
    archive: &Archive,
    path: P,
) -> StateResult<()>
where
    P: AsRef<Path> + Send + Sync + Debug,
{
    match download_archive(api, archive).await {
        Ok(stream) => {
            info!("downloading archive {archive}…");
            let case = extract(stream, archive.digest.as_deref(), &path).await;

            info!("downloaded archive {archive}");
            conclude(archive, case, &path)
        }
        Err(StateError::Retry) => {
            error!("failed to download archive {archive}");
            Err(StateError::Retry)
        }
        Err(err) => Err(err),
    }
}

async fn extract<S, P>(stream: S, digest: Option<&str>, path: P) -> Case
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
    P: AsRef<Path> + Send + Sync + Debug,
{
    let mut sha_hasher = sha2::Sha256::new();
    let mut read = stream
        .map_ok(|bytes| {
            sha_hasher.update(&bytes);
            bytes
        })
        .map_err(std::io::Error::other)
        .into_async_read();

    match extract_archive(ZipFileReader::new(&mut read), &path).await {
        Ok(()) => {
            // Reads to end for consuming whole buf to hasher, neglecting the error
            drop(read.read_to_end(&mut Vec::new()).await);
            drop(read);

            match digest.map(|digest| (digest, sha256_hex(digest))) {
                Some((_, Some(expected))) => {
                    if hex::encode(sha_hasher.finalize()).eq_ignore_ascii_case(expected) {
                        Case::Extracted
                    } else {
                        Case::HashUnmatch
                    }
                }
                Some((digest, None)) => {
                    warn!("unsupported digest {digest} for {path:?}");
                    Case::Extracted
                }
                None => {
                    warn!("digest not provided for {path:?}");
                    Case::Extracted
                }
            }
        }
        Err(err) => Case::Failed(anyhow!(err)),
    }
}

fn conclude<P>(archive: &Archive, case: Case, path: P) -> StateResult<()>
where
    P: AsRef<Path> + Debug,
{
    match case {
        Case::Extracted => {
            info!("successfully extracted {archive} to {path:?}");
            Ok(())
        }
        Case::HashUnmatch => {
            error!("failed to extract {archive} to {path:?}: broken archive");
            Err(StateError::Cancelled)
        }
        Case::Failed(err) => {
            error!("failed to extract {archive} to {path:?}: {err}");
            Err(StateError::Retry)
        }
    }
}
