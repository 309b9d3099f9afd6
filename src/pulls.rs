//! Pull requests, and the choice of one pull request per branch.

use std::{collections::BTreeMap, pin::pin};

use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt as _};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// The state of a pull request.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Closed,
    Open,
}

impl PrState {
    /// The lowercase name GitHub uses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Represents a pull request from GitHub REST API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub html_url: String,
    pub title: String,
    pub state: PrState,
    pub updated_at: DateTime<Utc>,
    /// Where comments on the pull request's conversation are listed and posted.
    pub comments_url: String,
    pub head: PrHead,
}

/// The branch a pull request proposes to merge.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PrHead {
    /// `owner:branch`. Unambiguous, since an account can own at most one fork of a repository.
    pub label: String,
    #[serde(rename = "ref")]
    pub branch: String,
}

impl PullRequest {
    /// Whether the pull request has been closed or merged.
    pub fn is_closed(&self) -> bool {
        self.state == PrState::Closed
    }

    fn rank(&self) -> (bool, DateTime<Utc>) {
        (self.state == PrState::Open, self.updated_at)
    }
}

/// The best pull request per head label.
pub type PullRequests = BTreeMap<String, PullRequest>;

/// Returns the `owner:branch` label of a branch.
pub fn label(owner: &str, branch: &str) -> String {
    format!("{owner}:{branch}")
}

/// Keeps the best pull request for each head label.
///
/// Any open pull request outranks every closed one; within the same state, the most recently
/// updated wins. Closed pull requests are kept so a branch whose only pull request was closed
/// can be suppressed rather than published.
///
/// # Errors
///
/// Returns the first [`ApiError`] from the stream.
pub async fn resolve<S>(pull_requests: S) -> Result<PullRequests, ApiError>
where
    S: Stream<Item = Result<PullRequest, ApiError>>,
{
    let mut pull_requests = pin!(pull_requests);
    let mut best = PullRequests::new();

    while let Some(pr) = pull_requests.try_next().await? {
        match best.get(&pr.head.label) {
            Some(current) if current.rank() >= pr.rank() => {}
            _ => {
                best.insert(pr.head.label.clone(), pr);
            }
        }
    }

    Ok(best)
}
