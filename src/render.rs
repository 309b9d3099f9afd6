//! HTML pages of the assembled site.

#![cfg(feature = "site")]

use std::path::Path;

use anyhow::{Context as _, Result};
use askama::Template;
use chrono::{DateTime, Utc};
use reqwest::Url;

use crate::{layout::SiteItem, release::Release};

/// The stylesheet of the branch index.
pub const BRANCHES_CSS: &str = include_str!("../templates/branches.css");

/// Formats a timestamp like `Monday 3 March 2025, 4:05 PM UTC`.
pub fn pretty_datetime(time: &DateTime<Utc>) -> String {
    time.format("%A %-d %B %Y, %-I:%M %p %Z").to_string()
}

/// The pull request shown next to a branch.
#[derive(Debug)]
pub struct PrView {
    pub number: u64,
    pub html_url: String,
    pub title: String,
    pub state: &'static str,
}

/// The build shown next to a branch.
#[derive(Debug)]
pub struct BuildView {
    pub short_sha: String,
    pub run_url: String,
    pub expired: bool,
    /// When a downloadable build stops being downloadable.
    pub expires: Option<String>,
}

/// One row of the branch index.
#[derive(Debug)]
pub struct BranchView {
    pub name: String,
    pub is_default: bool,
    /// Relative to the `branches/` directory.
    pub href: Option<String>,
    pub pull_request: Option<PrView>,
    pub build: Option<BuildView>,
}

impl BranchView {
    /// Builds the row for `item`.
    pub fn new(item: &SiteItem, default_org: &str, site_url: &Url) -> Self {
        Self {
            name: item.display_name(default_org),
            is_default: item.is_default,
            href: item.destination.as_ref().map(|destination| destination.index_href(site_url)),
            pull_request: item.pull_request.as_ref().map(|pr| PrView {
                number: pr.number,
                html_url: pr.html_url.clone(),
                title: pr.title.clone(),
                state: pr.state.as_str(),
            }),
            build: item.build.as_ref().map(|build| BuildView {
                short_sha: build.workflow_run.head_sha.chars().take(7).collect(),
                run_url: build.workflow_run.html_url.clone(),
                expired: build.artifact.expired,
                expires: build
                    .artifact
                    .expires_at
                    .filter(|_| build.is_fresh())
                    .map(|expires_at| pretty_datetime(&expires_at)),
            }),
        }
    }
}

/// The release shown at the top of the branch index.
#[derive(Debug)]
pub struct ReleaseView {
    pub name: String,
    pub html_url: String,
    pub published: Option<String>,
}

impl From<&Release> for ReleaseView {
    fn from(release: &Release) -> Self {
        Self {
            name: release.display_name().to_owned(),
            html_url: release.data.html_url.clone(),
            published: release
                .data
                .published_at
                .as_deref()
                .and_then(|published| DateTime::parse_from_rfc3339(published).ok())
                .map(|published| pretty_datetime(&published.with_timezone(&Utc))),
        }
    }
}

/// `branches/index.html`.
#[derive(Debug, Template)]
#[template(path = "branches.html")]
pub struct BranchesPage {
    pub repo_name: String,
    pub repo_url: String,
    pub latest_release: Option<ReleaseView>,
    pub branches: Vec<BranchView>,
    pub generation_time: String,
}

/// A page sending visitors elsewhere, used at the root when nothing was published there.
#[derive(Debug, Template)]
#[template(path = "redirect.html")]
pub struct RedirectPage {
    pub target: String,
}

/// Renders `template` into the file `target`.
///
/// # Errors
///
/// Returns an error if rendering or writing fails.
pub async fn render_to<T: Template>(template: &T, target: &Path) -> Result<()> {
    let html = template
        .render()
        .with_context(|| format!("failed to render {}", target.display()))?;
    tokio::fs::write(target, html)
        .await
        .with_context(|| format!("failed to write {}", target.display()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;
    use crate::{
        directory::tests::build,
        layout::Destination,
        pulls::{PrState, tests::pr},
    };

    fn site() -> Url {
        Url::parse("https://up.github.io/repo/").unwrap()
    }

    fn items() -> Vec<SiteItem> {
        let mut expiring = build(2, "alice", "feature", false);
        expiring.artifact.expires_at = Some(Utc.with_ymd_and_hms(2025, 8, 1, 9, 30, 0).unwrap());
        vec![
            SiteItem {
                org: "up".to_owned(),
                name: "main".to_owned(),
                is_default: true,
                pull_request: None,
                build: Some(build(1, "up", "main", false)),
                destination: Some(Destination::Root),
            },
            SiteItem {
                org: "alice".to_owned(),
                name: "feature".to_owned(),
                is_default: false,
                pull_request: Some(pr(12, "alice:feature", PrState::Open, 4)),
                build: Some(expiring),
                destination: Some(Destination::Branch {
                    org: "alice".to_owned(),
                    branch: "feature".to_owned(),
                }),
            },
            SiteItem {
                org: "up".to_owned(),
                name: "stale".to_owned(),
                is_default: false,
                pull_request: None,
                build: Some(build(3, "up", "stale", true)),
                destination: None,
            },
        ]
    }

    #[test]
    fn formats_dates() {
        let time = Utc.with_ymd_and_hms(2025, 3, 3, 16, 5, 0).unwrap();
        assert_eq!(pretty_datetime(&time), "Monday 3 March 2025, 4:05 PM UTC");
    }

    #[test]
    fn renders_branch_index() {
        let page = BranchesPage {
            repo_name: "up/repo".to_owned(),
            repo_url: "https://github.com/up/repo".to_owned(),
            latest_release: None,
            branches: items().iter().map(|item| BranchView::new(item, "up", &site())).collect(),
            generation_time: "now".to_owned(),
        };
        let html = page.render().unwrap();

        assert!(html.contains(">main</a>"));
        assert!(html.contains(">alice:feature</a>"));
        assert!(html.contains(r#"<span class="branch">stale</span>"#));
        assert!(html.contains("#12"));
        assert!(html.contains("build expired"));
        assert!(html.contains("expires Friday 1 August 2025, 9:30 AM UTC"));
        assert!(!html.contains("Latest release"));
    }

    #[test]
    fn escapes_branch_names() {
        let mut item = items().remove(2);
        item.name = "<script>".to_owned();
        let page = BranchesPage {
            repo_name: "up/repo".to_owned(),
            repo_url: "https://github.com/up/repo".to_owned(),
            latest_release: None,
            branches: vec![BranchView::new(&item, "up", &site())],
            generation_time: "now".to_owned(),
        };
        assert!(!page.render().unwrap().contains("<script>"));
    }

    #[test]
    fn renders_redirect() {
        let html = RedirectPage {
            target: "branches/".to_owned(),
        }
        .render()
        .unwrap();
        assert!(html.contains("url=branches"));
    }
}
