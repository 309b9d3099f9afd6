//! The live branches of every fork encountered during a run.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    error::ApiError,
    github::Forge,
    workflow::{WorkflowRun, artifact::Artifact},
};

/// A successful workflow run together with the artifact it uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub workflow_run: WorkflowRun,
    pub artifact: Artifact,
}

impl Build {
    /// Whether the build's artifact can still be downloaded.
    pub fn is_fresh(&self) -> bool {
        self.artifact.is_fresh()
    }
}

/// A branch that currently exists in its fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    build: Option<Build>,
}

impl Branch {
    /// Creates a branch that has not been matched with a build yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            build: None,
        }
    }

    /// The freshest build found for this branch so far.
    pub fn build(&self) -> Option<&Build> {
        self.build.as_ref()
    }

    /// Whether the branch already holds a build that can be downloaded.
    pub fn has_fresh_build(&self) -> bool {
        self.build.as_ref().is_some_and(Build::is_fresh)
    }

    /// Offers a candidate build, returning whether it was accepted.
    ///
    /// A candidate replaces the current build only if there is none, or if the current one has
    /// expired and the candidate has not. Callers offer builds newest-first, so a recorded fresh
    /// build is never replaced.
    pub fn offer(&mut self, candidate: Build) -> bool {
        let accept = match &self.build {
            None => true,
            Some(current) => !current.is_fresh() && candidate.is_fresh(),
        };
        if accept {
            self.build = Some(candidate);
        }
        accept
    }
}

/// A fork of the upstream repository (or the upstream repository itself).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fork {
    /// Live branches by name. A deleted fork has none.
    pub live_branches: BTreeMap<String, Branch>,
}

impl Fork {
    /// Creates a fork with the given live branches.
    pub fn with_branches<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            live_branches: names
                .into_iter()
                .map(|name| {
                    let branch = Branch::new(name);
                    (branch.name.clone(), branch)
                })
                .collect(),
        }
    }
}

/// The reconciled forks of a run, by owner login.
pub type Forks = BTreeMap<String, Fork>;

/// Lazily enumerates the branches of each fork, at most once per owner.
#[derive(Debug)]
pub struct Directory<'a, F> {
    forge: &'a F,
    forks: Forks,
}

impl<'a, F: Forge> Directory<'a, F> {
    /// Creates an empty directory backed by `forge`.
    pub fn new(forge: &'a F) -> Self {
        Self {
            forge,
            forks: Forks::new(),
        }
    }

    /// Returns the fork owned by `owner`, enumerating the branches of `full_name` on first use.
    ///
    /// A fork whose enumeration is not found has been deleted and yields no branches.
    ///
    /// # Errors
    ///
    /// Returns any [`ApiError`] other than not-found.
    pub async fn ensure_fork(&mut self, owner: &str, full_name: &str) -> Result<&mut Fork, ApiError> {
        if !self.forks.contains_key(owner) {
            let fork = match self.forge.list_branches(full_name).await {
                Ok(branches) => Fork::with_branches(branches.into_iter().map(|branch| branch.name)),
                Err(err) if err.is_not_found() => {
                    debug!("404 when fetching branches for {full_name}; assuming this fork was deleted");
                    Fork::default()
                }
                Err(err) => return Err(err),
            };
            self.forks.insert(owner.to_owned(), fork);
        }

        Ok(self
            .forks
            .entry(owner.to_owned())
            .or_default())
    }

    /// Consumes the directory, returning every fork encountered.
    pub fn into_forks(self) -> Forks {
        self.forks
    }
}
