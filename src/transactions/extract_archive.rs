use async_zip::{
    base::read::stream::{Ready, ZipFileReader},
    error::ZipError,
};
use futures::io::{AsyncBufRead, AsyncWriteExt as _};
use tokio_util::compat::TokioAsyncWriteCompatExt as _;

use std::path::{Path, PathBuf};

/// Extracts an archive of [`ZipFileReader<Ready<R>>`] to a specified path.
/// This function will sanitize the file path and create intermediate directories if possible.
///
/// Existing files are overwritten and unrelated files are left alone, so the site root can
/// receive a build after other content was placed below it.
///
/// # Errors
///
/// Returns a [`ZipError`] if the archive fails to extract.
pub async fn extract_archive<R, P>(
    archive: ZipFileReader<Ready<R>>,
    path: P,
) -> Result<(), ZipError>
where
    R: AsyncBufRead + Unpin,
    P: AsRef<Path> + Send + Sync,
{
    tokio::fs::create_dir_all(&path).await?;

    let mut archive = archive;
    while let Some(mut reading) = archive.next_with_entry().await? {
        let reader = reading.reader();
        let Ok(name) = reader.entry().filename().as_str() else {
            archive = reading.skip().await?;
            continue;
        };
        let p = path.as_ref().join(sanitize_file_path(name));

        if name.ends_with('/') {
            // Is a directory
            tokio::fs::create_dir_all(&p).await?;
        } else {
            // Creates parent directories. They may not exist if iteration is out of order or the archive does not contain directory entries
            if let Some(parent) = p.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let mut writer = tokio::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&p)
                .await?
                .compat_write();
            futures::io::copy(reading.reader_mut(), &mut writer).await?;
            writer.flush().await?;
        }

        archive = reading.done().await?;
    }

    Ok(())
}

fn sanitize_file_path(path: &str) -> PathBuf {
    // Replaces backwards slashes
    path.replace('\\', "/")
        // Sanitizes each component
        .split('/')
        .map(sanitize_filename::sanitize)
        .filter(|component| !component.is_empty())
        .collect()
}
