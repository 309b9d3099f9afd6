//! Data models of GitHub Actions workflows.

use serde::{Deserialize, Serialize};

pub mod artifact;

/// Represents a GitHub Actions workflow from GitHub REST API.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
    pub path: String,
}

/// Represents a GitHub Actions workflow run from GitHub REST API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WorkflowRun {
    pub id: u64,
    /// [`None`] for runs not triggered from a branch.
    pub head_branch: Option<String>,
    pub head_sha: String,
    pub html_url: String,
    pub artifacts_url: String,
    /// [`None`] once the fork the run was built from has been deleted.
    pub head_repository: Option<HeadRepository>,
}

/// The repository a workflow run was triggered from, which may be a fork.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HeadRepository {
    pub full_name: String,
    pub owner: Owner,
}

/// The account owning a repository.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Owner {
    pub login: String,
}
