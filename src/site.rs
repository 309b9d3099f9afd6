//! Assembles the site: the latest release at the root and every fresh branch build below it.

#![cfg(feature = "site")]

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    pin::pin,
};

use anyhow::{Context as _, Result};
use chrono::Utc;
use futures::{Stream, TryStreamExt as _, future};
use reqwest::Url;
use tokio::io::AsyncWriteExt as _;
use tracing::{info, warn};

use crate::{
    env::{Config, RepoRef},
    error::{ApiError, ConfigurationError},
    github::{GitHubApi, PagesSite, RepoDetails, parse_url},
    layout::{BRANCHES_DIR, Plan, Planner},
    pulls,
    reconcile::Reconciler,
    release::select_latest,
    render::{BRANCHES_CSS, BranchView, BranchesPage, RedirectPage, ReleaseView, pretty_datetime, render_to},
    transactions::{Archive, fetch_archive},
    workflow::Workflow,
};

/// The Pages `build_type` of sites deployed by GitHub Actions.
pub const PAGES_BUILD_TYPE: &str = "workflow";

/// Builds the whole site into [`Config::output_dir`] and hands off the status records.
///
/// Returns the absolute path of the site root.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if the repository is not set up to publish the site, or
/// any other error if listing, downloading or writing fails.
pub async fn amalgamate(api: &GitHubApi, config: &Config) -> Result<PathBuf> {
    let (workflow_name, artifact_name) = config.build_names()?;
    let repo = &config.repository;

    let details: RepoDetails = api
        .get(api.url(&format!("/repos/{repo}"), &[])?.as_str())
        .await
        .with_context(|| format!("failed to fetch details of {repo}"))?;
    let pages = api
        .get::<PagesSite>(api.url(&format!("/repos/{repo}/pages"), &[])?.as_str())
        .await;
    let site_url = check_pages(repo, pages)?;

    let releases = api.paginate(api.url(&format!("/repos/{repo}/releases"), &[])?, None);
    let latest_release = select_latest(releases, artifact_name).await?;

    info!("finding workflow '{workflow_name}'…");
    let workflows = api.paginate(
        api.url(&format!("/repos/{repo}/actions/workflows"), &[])?,
        Some("workflows"),
    );
    let workflow = find_workflow(workflows, workflow_name).await?;
    let runs = api.paginate(
        api.url(
            &format!("/repos/{repo}/actions/workflows/{}/runs", workflow.id),
            &[("status", "success")],
        )?,
        Some("workflow_runs"),
    );
    let forks = Reconciler::new(api, artifact_name).reconcile(runs).await?;

    let pull_requests = api.paginate(
        api.url(&format!("/repos/{repo}/pulls"), &[("state", "all")])?,
        None,
    );
    let pull_requests = pulls::resolve(pull_requests).await?;

    let root = config.output_dir.as_path();
    recreate_dir(root).await?;

    if let Some(release) = &latest_release {
        info!("publishing release {} to the site root", release.display_name());
        fetch(api, &Archive::from(&release.asset), root).await?;
    }

    let plan = Planner::new(&details.owner.login, &details.default_branch, &site_url).plan(
        &forks,
        &pull_requests,
        latest_release.is_some(),
    );

    let branches_dir = root.join(BRANCHES_DIR);
    tokio::fs::create_dir_all(&branches_dir)
        .await
        .with_context(|| format!("failed to create {}", branches_dir.display()))?;

    for (item, build, destination) in plan.published() {
        info!(
            "publishing {} to /{}",
            item.display_name(&details.owner.login),
            destination.site_path()
        );
        fetch(api, &Archive::from(&build.artifact), destination.dir(root)).await?;
    }

    if let Some(redirect) = root_redirect(latest_release.is_some(), &plan) {
        warn!("nothing published at the site root, redirecting it to the branch index");
        render_to(&redirect, &root.join("index.html")).await?;
    }

    let page = BranchesPage {
        repo_name: details.full_name.clone(),
        repo_url: details.html_url.clone(),
        latest_release: latest_release.as_ref().map(ReleaseView::from),
        branches: plan
            .items
            .iter()
            .map(|item| BranchView::new(item, &details.owner.login, &site_url))
            .collect(),
        generation_time: pretty_datetime(&Utc::now()),
    };
    render_to(&page, &branches_dir.join("index.html")).await?;
    tokio::fs::write(branches_dir.join("branches.css"), BRANCHES_CSS)
        .await
        .context("failed to write branches.css")?;

    plan.status.write(&config.status_file).await?;

    let root = std::path::absolute(root)
        .with_context(|| format!("failed to resolve {}", root.display()))?;
    if let Some(output) = &config.github_output {
        append_output(output, "path", &root.to_string_lossy()).await?;
    }
    info!("assembled site at {}", root.display());
    Ok(root)
}

/// Returns the url the Pages site is served at, once it is known to be deployed by a workflow.
fn check_pages(repo: &RepoRef, pages: Result<PagesSite, ApiError>) -> Result<Url> {
    let misconfigured = || {
        ConfigurationError::new(
            "GitHub Pages must be enabled, with the source set to GitHub Actions, in the repository settings.",
        )
        .with(format!(
            "Go to https://github.com/{repo}/settings/pages to fix this."
        ))
    };

    match pages {
        Ok(site) if site.build_type.as_deref() == Some(PAGES_BUILD_TYPE) => {
            Ok(parse_url(&site.html_url)?)
        }
        Ok(site) => {
            warn!("pages of {repo} are built by {:?}", site.build_type);
            Err(misconfigured().into())
        }
        Err(err) if err.is_not_found() => Err(misconfigured().into()),
        Err(err) => Err(err.into()),
    }
}

/// Finds the workflow called `name` among `workflows`.
async fn find_workflow<S>(workflows: S, name: &str) -> Result<Workflow>
where
    S: Stream<Item = Result<Workflow, ApiError>>,
{
    let mut workflows = pin!(workflows.try_filter(|workflow| future::ready(workflow.name == name)));

    match workflows.try_next().await? {
        Some(workflow) => {
            info!("found workflow {} ({})", workflow.id, workflow.path);
            Ok(workflow)
        }
        None => Err(ConfigurationError::new(format!(
            "Workflow '{name}' not found. Has this project been built at least once?"
        ))
        .into()),
    }
}

/// The page to serve at the site root when neither a release nor the default branch is there.
fn root_redirect(release_published: bool, plan: &Plan) -> Option<RedirectPage> {
    (!release_published && !plan.claims_root()).then(|| RedirectPage {
        target: format!("{BRANCHES_DIR}/"),
    })
}

async fn fetch<P: AsRef<Path>>(api: &GitHubApi, archive: &Archive, path: P) -> Result<()> {
    let path = path.as_ref();
    fetch_archive(api, archive, path)
        .await
        .with_context(|| format!("failed to publish {archive} to {}", path.display()))
}

/// Empties `dir`, creating it if needed.
async fn recreate_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err).with_context(|| format!("failed to remove {}", dir.display())),
    }
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))
}

/// Appends `key=value` to a step output file.
async fn append_output(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(format!("{key}={value}\n").as_bytes())
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use futures::stream;
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;

    use super::*;
    use crate::{
        directory::{Fork, Forks, tests::build},
        layout::Destination,
        pulls::PullRequests,
    };

    fn repo() -> RepoRef {
        "up/repo".parse().unwrap()
    }

    fn pages(build_type: Option<&str>) -> Result<PagesSite, ApiError> {
        Ok(PagesSite {
            build_type: build_type.map(str::to_owned),
            html_url: "https://up.github.io/repo/".to_owned(),
        })
    }

    fn configuration_messages(err: &anyhow::Error) -> Vec<String> {
        err.downcast_ref::<ConfigurationError>()
            .map(|err| err.messages.clone())
            .unwrap_or_default()
    }

    #[test]
    fn workflow_built_pages_give_the_site_url() {
        let url = check_pages(&repo(), pages(Some(PAGES_BUILD_TYPE))).unwrap();
        assert_eq!(url.as_str(), "https://up.github.io/repo/");
    }

    #[test]
    fn pages_must_be_enabled_and_built_by_a_workflow() {
        let expected = [
            "GitHub Pages must be enabled, with the source set to GitHub Actions, in the repository settings.",
            "Go to https://github.com/up/repo/settings/pages to fix this.",
        ];

        let legacy = check_pages(&repo(), pages(Some("legacy"))).unwrap_err();
        assert_eq!(configuration_messages(&legacy), expected);

        let missing = check_pages(
            &repo(),
            Err(ApiError::NotFound {
                url: "https://api.github.com/repos/up/repo/pages".to_owned(),
            }),
        )
        .unwrap_err();
        assert_eq!(configuration_messages(&missing), expected);
    }

    #[test]
    fn other_pages_failures_are_not_configuration_errors() {
        let err = check_pages(
            &repo(),
            Err(ApiError::Status {
                url: "https://api.github.com/repos/up/repo/pages".to_owned(),
                status: StatusCode::BAD_GATEWAY,
            }),
        )
        .unwrap_err();
        assert!(err.downcast_ref::<ConfigurationError>().is_none());
        assert!(err.downcast_ref::<ApiError>().is_some());
    }

    fn workflow(id: u64, name: &str) -> Workflow {
        Workflow {
            id,
            name: name.to_owned(),
            path: format!(".github/workflows/{id}.yml"),
        }
    }

    #[tokio::test]
    async fn finds_workflow_by_name() {
        let workflows = stream::iter([Ok(workflow(1, "Lint")), Ok(workflow(2, "Build"))]);
        assert_eq!(find_workflow(workflows, "Build").await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn missing_workflow_is_a_configuration_error() {
        let workflows = stream::iter([Ok(workflow(1, "Lint"))]);
        let err = find_workflow(workflows, "Build").await.unwrap_err();
        assert_eq!(
            configuration_messages(&err),
            ["Workflow 'Build' not found. Has this project been built at least once?"]
        );
    }

    fn forks(main_expired: bool) -> Forks {
        let mut fork = Fork::with_branches(["main"]);
        if let Some(main) = fork.live_branches.get_mut("main") {
            assert!(main.offer(build(1, "up", "main", main_expired)));
        }
        BTreeMap::from([("up".to_owned(), fork)])
    }

    fn plan(main_expired: bool, release_published: bool) -> Plan {
        let site = Url::parse("https://up.github.io/repo/").unwrap();
        Planner::new("up", "main", &site).plan(
            &forks(main_expired),
            &PullRequests::new(),
            release_published,
        )
    }

    #[test]
    fn default_branch_takes_the_root_without_a_release() {
        let plan = plan(false, false);
        assert_eq!(plan.items[0].destination, Some(Destination::Root));
        assert!(root_redirect(false, &plan).is_none());
    }

    #[test]
    fn release_sends_default_branch_below_branches() {
        let plan = plan(false, true);
        assert_eq!(
            plan.items[0].destination.as_ref().map(Destination::site_path).as_deref(),
            Some("branches/up/main/")
        );
        assert!(root_redirect(true, &plan).is_none());
    }

    #[test]
    fn empty_root_redirects_to_branch_index() {
        let plan = plan(true, false);
        let redirect = root_redirect(false, &plan).unwrap();
        assert_eq!(redirect.target, "branches/");
    }

    #[tokio::test]
    async fn recreates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("_build");
        tokio::fs::create_dir_all(root.join("branches/old")).await.unwrap();
        tokio::fs::write(root.join("index.html"), "stale").await.unwrap();

        recreate_dir(&root).await.unwrap();

        assert!(root.is_dir());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);

        let fresh = dir.path().join("fresh");
        recreate_dir(&fresh).await.unwrap();
        assert!(fresh.is_dir());
    }

    #[tokio::test]
    async fn appends_step_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        tokio::fs::write(&output, "earlier=1\n").await.unwrap();

        append_output(&output, "path", "/site").await.unwrap();

        assert_eq!(
            tokio::fs::read_to_string(&output).await.unwrap(),
            "earlier=1\npath=/site\n"
        );
    }
}
