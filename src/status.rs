//! The handoff of per-branch outcomes from the publish phase to the status phase.
//!
//! The publish phase appends one [`StatusRecord`] per branch that reached a publish decision
//! and writes them once, as JSON Lines, when it finishes. The status phase drains that file in
//! a separate process, so a failure to post statuses never undoes a completed publish.

use std::{io::ErrorKind, path::Path};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What the status phase needs to know about one branch.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    /// Where the branch was published, if it was.
    pub publish_url: Option<String>,
    /// The commit the published build was made from.
    pub commit_sha: Option<String>,
    /// The comment thread of the branch's pull request.
    pub comments_url: Option<String>,
}

/// An append-only, ordered queue of [`StatusRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusQueue {
    records: Vec<StatusRecord>,
}

impl StatusQueue {
    /// Appends a record. Records are never modified once appended.
    pub fn append(&mut self, record: StatusRecord) {
        self.records.push(record);
    }

    /// The records appended so far, in order.
    pub fn records(&self) -> &[StatusRecord] {
        &self.records
    }

    /// Writes every record to `path`, one JSON document per line, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let mut contents = String::new();
        for record in &self.records {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }

        tokio::fs::write(path, contents)
            .await
            .with_context(|| format!("failed to write status records to {}", path.display()))?;
        info!("handed off {} status records to {}", self.records.len(), path.display());
        Ok(())
    }

    /// Reads every record written to `path`, in order, and removes the file.
    ///
    /// A missing file means nothing was handed off and yields no records.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or removed, or holds a malformed record.
    pub async fn drain(path: &Path) -> Result<Vec<StatusRecord>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no status records at {}", path.display());
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read status records from {}", path.display()));
            }
        };

        let records = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("malformed status record {} in {}", index + 1, path.display())
                })
            })
            .collect::<Result<Vec<StatusRecord>>>()?;

        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("failed to remove {}", path.display()))?;
        Ok(records)
    }
}
