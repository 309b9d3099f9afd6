use serde::{Deserialize, Serialize};

use crate::workflow::Owner;

/// A branch as listed by `GET /repos/{owner}/{repo}/branches`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub commit: BranchCommit,
}

/// The commit a branch points at.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BranchCommit {
    pub sha: String,
}

/// The repository details needed to lay out the site.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RepoDetails {
    pub full_name: String,
    pub html_url: String,
    pub default_branch: String,
    pub owner: Owner,
}

/// The GitHub Pages site of a repository.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PagesSite {
    /// `workflow` when deployed by GitHub Actions, `legacy` when deployed from a branch.
    pub build_type: Option<String>,
    /// The url the site is published at.
    pub html_url: String,
}

/// A comment on an issue or pull request thread.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IssueComment {
    pub id: u64,
    pub url: String,
    #[serde(default)]
    pub body: Option<String>,
}
