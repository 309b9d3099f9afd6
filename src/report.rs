//! Reports handed-off publish outcomes as commit statuses and pull request comments.

#![cfg(feature = "site")]

use std::pin::pin;

use futures::{TryStreamExt as _, future};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    env::RepoRef,
    error::ApiError,
    github::{GitHubApi, IssueComment, parse_url},
    status::StatusRecord,
};

/// Marks the comment this tool owns on a pull request thread.
pub const COMMENT_MARKER: &str = "<!-- branch-pages-preview -->";

/// The side effects of the status phase.
pub trait StatusPoster {
    /// Sets, or updates, the commit status of `sha` to point at `target_url`.
    fn set_commit_status(
        &self,
        sha: &str,
        target_url: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Finds the comment carrying [`COMMENT_MARKER`] in the thread at `comments_url`.
    fn find_comment(
        &self,
        comments_url: &str,
    ) -> impl Future<Output = Result<Option<IssueComment>, ApiError>> + Send;

    /// Posts a new comment to the thread at `comments_url`.
    fn create_comment(
        &self,
        comments_url: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Replaces the body of an existing comment.
    fn update_comment(
        &self,
        comment: &IssueComment,
        body: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Posts commit statuses and pull request comments through GitHub REST API.
#[derive(Debug)]
pub struct GitHubPoster<'a> {
    api: &'a GitHubApi,
    repository: &'a RepoRef,
    context: &'a str,
}

impl<'a> GitHubPoster<'a> {
    /// Creates a poster for statuses named `context` on `repository`.
    pub fn new(api: &'a GitHubApi, repository: &'a RepoRef, context: &'a str) -> Self {
        Self {
            api,
            repository,
            context,
        }
    }
}

impl StatusPoster for GitHubPoster<'_> {
    async fn set_commit_status(&self, sha: &str, target_url: &str) -> Result<(), ApiError> {
        let url = self.api.url(&format!("/repos/{}/statuses/{sha}", self.repository), &[])?;
        let body = json!({
            "state": "success",
            "target_url": target_url,
            "description": "Preview published",
            "context": self.context,
        });
        self.api
            .send_json::<_, serde_json::Value>(Method::POST, url.as_str(), &body)
            .await
            .map(drop)
    }

    async fn find_comment(&self, comments_url: &str) -> Result<Option<IssueComment>, ApiError> {
        let url = parse_url(comments_url)?;
        let mut marked = pin!(self.api.paginate::<IssueComment>(url, None).try_filter(|comment| {
            future::ready(
                comment
                    .body
                    .as_deref()
                    .is_some_and(|body| body.contains(COMMENT_MARKER)),
            )
        }));
        marked.try_next().await
    }

    async fn create_comment(&self, comments_url: &str, body: &str) -> Result<(), ApiError> {
        self.api
            .send_json::<_, serde_json::Value>(Method::POST, comments_url, &json!({ "body": body }))
            .await
            .map(drop)
    }

    async fn update_comment(&self, comment: &IssueComment, body: &str) -> Result<(), ApiError> {
        self.api
            .send_json::<_, serde_json::Value>(Method::PATCH, &comment.url, &json!({ "body": body }))
            .await
            .map(drop)
    }
}

/// The body of the comment linking a published preview.
pub fn preview_comment(publish_url: &str) -> String {
    format!("{COMMENT_MARKER}\nA preview of this branch is available at {publish_url}")
}

/// The body of the comment once the preview is no longer published.
pub fn removed_comment() -> String {
    format!("{COMMENT_MARKER}\nThe preview of this branch is no longer published.")
}

/// Counts of side effects performed by [`report`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub statuses: usize,
    pub comments: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy)]
enum Category {
    CommitStatus,
    Comment,
}

/// Performs the side effects of every record, best-effort.
///
/// A category of side effect is abandoned for the remaining records the first time it reports
/// missing permissions; every other failure is logged and the next record is attempted.
pub async fn report<P: StatusPoster>(poster: &P, records: &[StatusRecord]) -> ReportSummary {
    let mut summary = ReportSummary::default();
    let mut statuses_enabled = true;
    let mut comments_enabled = true;

    for record in records {
        if statuses_enabled
            && let (Some(sha), Some(publish_url)) = (&record.commit_sha, &record.publish_url)
        {
            match poster.set_commit_status(sha, publish_url).await {
                Ok(()) => summary.statuses += 1,
                Err(err) => {
                    statuses_enabled &= !disables(Category::CommitStatus, &err);
                    summary.failures += 1;
                }
            }
        }

        if comments_enabled && let Some(comments_url) = &record.comments_url {
            match comment(poster, comments_url, record.publish_url.as_deref()).await {
                Ok(true) => summary.comments += 1,
                Ok(false) => {}
                Err(err) => {
                    comments_enabled &= !disables(Category::Comment, &err);
                    summary.failures += 1;
                }
            }
        }
    }

    info!(
        "posted {} commit statuses and {} comments ({} failures)",
        summary.statuses, summary.comments, summary.failures
    );
    summary
}

fn disables(category: Category, err: &ApiError) -> bool {
    if err.is_forbidden() {
        warn!("not permitted to post {category:?}, skipping the rest: {err}");
        true
    } else {
        warn!("failed to post {category:?}: {err}");
        false
    }
}

/// Creates or updates the marked comment, returning whether anything was posted.
async fn comment<P: StatusPoster>(
    poster: &P,
    comments_url: &str,
    publish_url: Option<&str>,
) -> Result<bool, ApiError> {
    let existing = poster.find_comment(comments_url).await?;
    match (existing, publish_url) {
        (Some(existing), Some(publish_url)) => {
            let body = preview_comment(publish_url);
            if existing.body.as_deref() == Some(body.as_str()) {
                debug!("comment {} is up to date", existing.url);
                return Ok(false);
            }
            poster.update_comment(&existing, &body).await?;
        }
        (None, Some(publish_url)) => {
            poster
                .create_comment(comments_url, &preview_comment(publish_url))
                .await?;
        }
        (Some(existing), None) => {
            let body = removed_comment();
            if existing.body.as_deref() == Some(body.as_str()) {
                return Ok(false);
            }
            poster.update_comment(&existing, &body).await?;
        }
        (None, None) => return Ok(false),
    }
    Ok(true)
}
