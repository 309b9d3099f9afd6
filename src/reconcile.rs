//! Matches every live branch of every fork with its freshest downloadable build.

use std::pin::pin;

use futures::{Stream, TryStreamExt as _};
use tracing::{debug, trace};

use crate::{
    directory::{Build, Directory, Forks},
    error::ApiError,
    github::Forge,
    workflow::WorkflowRun,
};

/// Picks the freshest build per branch from a history of successful workflow runs.
#[derive(Debug)]
pub struct Reconciler<'a, F> {
    forge: &'a F,
    artifact_name: &'a str,
}

impl<'a, F: Forge> Reconciler<'a, F> {
    /// Creates a reconciler looking for artifacts named `artifact_name`.
    pub fn new(forge: &'a F, artifact_name: &'a str) -> Self {
        Self {
            forge,
            artifact_name,
        }
    }

    /// Consumes `runs`, which must be ordered newest-first, and returns every fork seen.
    ///
    /// The stream is read to the end: runs of different forks and branches interleave freely,
    /// and a branch's first run in the stream may not have uploaded the artifact.
    ///
    /// # Errors
    ///
    /// Returns the first [`ApiError`] from the stream or from a listing that is not a not-found.
    pub async fn reconcile<S>(&self, runs: S) -> Result<Forks, ApiError>
    where
        S: Stream<Item = Result<WorkflowRun, ApiError>>,
    {
        let mut directory = Directory::new(self.forge);
        let mut runs = pin!(runs);

        while let Some(run) = runs.try_next().await? {
            let Some(head_repository) = &run.head_repository else {
                debug!("ignoring workflow run {} from deleted fork", run.html_url);
                continue;
            };
            let owner = head_repository.owner.login.clone();
            let full_name = head_repository.full_name.clone();

            let fork = directory.ensure_fork(&owner, &full_name).await?;
            let Some(branch) = run
                .head_branch
                .as_deref()
                .and_then(|name| fork.live_branches.get_mut(name))
            else {
                debug!(
                    "ignoring artifact for deleted branch {owner}/{}",
                    run.head_branch.as_deref().unwrap_or_default()
                );
                continue;
            };

            if branch.has_fresh_build() {
                trace!("{owner}:{} already has a fresh build", branch.name);
                continue;
            }

            let artifact = self
                .forge
                .list_artifacts(&run.artifacts_url)
                .await?
                .into_iter()
                .find(|artifact| artifact.name == self.artifact_name);
            let Some(artifact) = artifact else {
                debug!(
                    "workflow run {} has no artifact named {}",
                    run.html_url, self.artifact_name
                );
                continue;
            };

            let name = branch.name.clone();
            let expired = artifact.expired;
            if branch.offer(Build {
                workflow_run: run,
                artifact,
            }) {
                debug!("found {} build for {owner}:{name}", if expired { "expired" } else { "fresh" });
            }
        }

        Ok(directory.into_forks())
    }
}
