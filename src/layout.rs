//! Decides which branches are listed and published, and where.

use std::path::{Path, PathBuf};

use reqwest::Url;
use tracing::{debug, info};

use crate::{
    directory::{Build, Forks},
    pulls::{PullRequest, PullRequests, label},
    status::{StatusQueue, StatusRecord},
};

/// The directory, below the site root, holding every non-root branch.
pub const BRANCHES_DIR: &str = "branches";

/// Returns `items` sorted, with `first` moved to the front if present.
pub fn lead_sorted<'a, I>(items: I, first: &str) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = items.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();
    if let Some(position) = sorted.iter().position(|item| *item == first) {
        let lead = sorted.remove(position);
        sorted.insert(0, lead);
    }
    sorted
}

/// Where a published branch is extracted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The site root.
    Root,
    /// `branches/<org>/<branch>/`.
    Branch {
        /// The owner of the fork.
        org: String,
        /// The branch name, which may itself contain slashes.
        branch: String,
    },
}

impl Destination {
    /// The path relative to the site root, ending with a slash unless empty.
    pub fn site_path(&self) -> String {
        match self {
            Self::Root => String::new(),
            Self::Branch { org, branch } => format!("{BRANCHES_DIR}/{org}/{branch}/"),
        }
    }

    /// The directory to extract into, given the site root.
    pub fn dir(&self, site_root: &Path) -> PathBuf {
        match self {
            Self::Root => site_root.to_path_buf(),
            Self::Branch { org, branch } => site_root
                .join(BRANCHES_DIR)
                .join(org)
                .join(branch.split('/').collect::<PathBuf>()),
        }
    }

    fn segments(&self) -> Vec<&str> {
        match self {
            Self::Root => Vec::new(),
            Self::Branch { org, branch } => [BRANCHES_DIR, org.as_str()]
                .into_iter()
                .chain(branch.split('/'))
                .collect(),
        }
    }

    /// The link to this destination from the branch index in [`BRANCHES_DIR`].
    ///
    /// Each path segment is percent-encoded, so branch names like `fix#2` stay intact.
    pub fn index_href(&self, site_url: &Url) -> String {
        let index = directory_url(site_url, [BRANCHES_DIR]);
        match self {
            Self::Root => "../".to_owned(),
            Self::Branch { .. } => {
                let url = self.publish_url(site_url);
                url.strip_prefix(index.as_str())
                    .map_or_else(|| url.clone(), str::to_owned)
            }
        }
    }

    /// The absolute url this destination is served at, with each path segment percent-encoded.
    pub fn publish_url(&self, site_url: &Url) -> String {
        directory_url(site_url, self.segments()).into()
    }
}

/// Appends `segments` to the path of `base`, ending with a slash.
fn directory_url<I>(base: &Url, segments: I) -> Url
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments).push("");
    }
    url
}

/// A branch listed in the site index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteItem {
    pub org: String,
    pub name: String,
    /// Whether this is the default branch of the upstream repository.
    pub is_default: bool,
    pub pull_request: Option<PullRequest>,
    pub build: Option<Build>,
    /// Set only for branches whose build is published.
    pub destination: Option<Destination>,
}

impl SiteItem {
    /// `branch` for the upstream repository, `org:branch` for forks.
    pub fn display_name(&self, default_org: &str) -> String {
        if self.org == default_org {
            self.name.clone()
        } else {
            label(&self.org, &self.name)
        }
    }
}

/// The outcome of a planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Listed branches, in index order.
    pub items: Vec<SiteItem>,
    /// One record per branch that reached a publish decision.
    pub status: StatusQueue,
}

impl Plan {
    /// Whether a branch build was assigned the site root.
    pub fn claims_root(&self) -> bool {
        self.items
            .iter()
            .any(|item| item.destination == Some(Destination::Root))
    }

    /// The listed items that are published.
    pub fn published(&self) -> impl Iterator<Item = (&SiteItem, &Build, &Destination)> {
        self.items.iter().filter_map(|item| match (&item.build, &item.destination) {
            (Some(build), Some(destination)) => Some((item, build, destination)),
            _ => None,
        })
    }
}

/// Orders branches and assigns each published branch its destination.
#[derive(Debug, Clone)]
pub struct Planner<'a> {
    default_org: &'a str,
    default_branch: &'a str,
    site_url: &'a Url,
}

impl<'a> Planner<'a> {
    /// Creates a planner for a site served at `site_url`.
    pub fn new(default_org: &'a str, default_branch: &'a str, site_url: &'a Url) -> Self {
        Self {
            default_org,
            default_branch,
            site_url,
        }
    }

    /// Plans the site.
    ///
    /// Organizations are visited default first, then alphabetically; branches likewise within
    /// each organization. `root_claimed` is set when a release already occupies the site root.
    pub fn plan(&self, forks: &Forks, pull_requests: &PullRequests, mut root_claimed: bool) -> Plan {
        let mut plan = Plan::default();

        for org in lead_sorted(forks.keys().map(String::as_str), self.default_org) {
            let fork = &forks[org];
            for name in lead_sorted(fork.live_branches.keys().map(String::as_str), self.default_branch)
            {
                let branch = &fork.live_branches[name];
                let is_default = org == self.default_org && name == self.default_branch;

                if branch.build().is_none() && org != self.default_org {
                    debug!("ignoring never-built third-party branch {org}:{name}");
                    continue;
                }

                let pull_request = pull_requests.get(&label(org, name));
                if let Some(pr) = pull_request.filter(|pr| pr.is_closed() && !is_default) {
                    info!(
                        "ignoring branch {org}:{name}; newest pull request {} is closed",
                        pr.html_url
                    );
                    plan.status.append(StatusRecord {
                        publish_url: None,
                        commit_sha: None,
                        comments_url: Some(pr.comments_url.clone()),
                    });
                    continue;
                }

                if let Some(pr) = pull_request.filter(|_| !branch.has_fresh_build()) {
                    debug!("{org}:{name} has nothing to publish for {}", pr.html_url);
                    plan.status.append(StatusRecord {
                        publish_url: None,
                        commit_sha: None,
                        comments_url: Some(pr.comments_url.clone()),
                    });
                }

                let destination = branch.build().filter(|build| build.is_fresh()).map(|build| {
                    let destination = if is_default && !root_claimed {
                        root_claimed = true;
                        Destination::Root
                    } else {
                        Destination::Branch {
                            org: org.to_owned(),
                            branch: name.to_owned(),
                        }
                    };
                    plan.status.append(StatusRecord {
                        publish_url: Some(destination.publish_url(self.site_url)),
                        commit_sha: Some(build.workflow_run.head_sha.clone()),
                        comments_url: pull_request.map(|pr| pr.comments_url.clone()),
                    });
                    destination
                });

                plan.items.push(SiteItem {
                    org: org.to_owned(),
                    name: name.to_owned(),
                    is_default,
                    pull_request: pull_request.cloned(),
                    build: branch.build().cloned(),
                    destination,
                });
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::LazyLock};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        directory::{Fork, tests::build},
        pulls::{PrState, tests::pr},
    };

    const SITE: &str = "https://up.github.io/repo/";

    static SITE_URL: LazyLock<Url> = LazyLock::new(|| Url::parse(SITE).unwrap());

    fn planner() -> Planner<'static> {
        Planner::new("up", "main", &SITE_URL)
    }

    fn fork(branches: &[(&str, Option<(u64, bool)>)], owner: &str) -> Fork {
        let mut fork = Fork::with_branches(branches.iter().map(|(name, _)| *name));
        for (name, built) in branches {
            if let Some((id, expired)) = built {
                let offered = fork
                    .live_branches
                    .get_mut(*name)
                    .unwrap()
                    .offer(build(*id, owner, name, *expired));
                assert!(offered);
            }
        }
        fork
    }

    fn forks() -> Forks {
        BTreeMap::from([
            (
                "up".to_owned(),
                fork(
                    &[
                        ("zeta", Some((5, false))),
                        ("main", Some((1, false))),
                        ("brand-new", None),
                        ("stale", Some((2, true))),
                    ],
                    "up",
                ),
            ),
            (
                "bob".to_owned(),
                fork(&[("main", None), ("fix", Some((3, false)))], "bob"),
            ),
            ("alice".to_owned(), fork(&[("feature", Some((4, false)))], "alice")),
        ])
    }

    fn names(plan: &Plan) -> Vec<String> {
        plan.items.iter().map(|item| label(&item.org, &item.name)).collect()
    }

    #[test]
    fn lead_sorts() {
        assert_eq!(lead_sorted(["b", "a", "c"], "c"), ["c", "a", "b"]);
        assert_eq!(lead_sorted(["a", "b"], "z"), ["a", "b"]);
        assert_eq!(lead_sorted([], "z"), Vec::<&str>::new());
    }

    #[test]
    fn orders_default_org_and_branch_first() {
        let plan = planner().plan(&forks(), &PullRequests::new(), false);
        assert_eq!(
            names(&plan),
            [
                "up:main",
                "up:brand-new",
                "up:stale",
                "up:zeta",
                "alice:feature",
                "bob:fix",
            ]
        );
    }

    #[test]
    fn foreign_never_built_branches_are_not_listed() {
        let plan = planner().plan(&forks(), &PullRequests::new(), false);
        let names = names(&plan);
        assert!(!names.contains(&"bob:main".to_owned()));
        assert!(names.contains(&"up:brand-new".to_owned()));
    }

    #[test]
    fn assigns_destinations() {
        let plan = planner().plan(&forks(), &PullRequests::new(), false);
        let destinations: Vec<_> = plan
            .items
            .iter()
            .map(|item| item.destination.as_ref().map(Destination::site_path))
            .collect();
        assert_eq!(
            destinations,
            [
                Some(String::new()),
                None,
                None,
                Some("branches/up/zeta/".to_owned()),
                Some("branches/alice/feature/".to_owned()),
                Some("branches/bob/fix/".to_owned()),
            ]
        );
        assert!(plan.claims_root());
        assert_eq!(plan.published().count(), 4);
    }

    #[test]
    fn release_keeps_the_root() {
        let plan = planner().plan(&forks(), &PullRequests::new(), true);
        assert!(!plan.claims_root());
        assert_eq!(
            plan.items[0].destination,
            Some(Destination::Branch {
                org: "up".to_owned(),
                branch: "main".to_owned(),
            })
        );
        assert_eq!(
            plan.items
                .iter()
                .filter(|item| item.destination == Some(Destination::Root))
                .count(),
            0
        );
    }

    #[test]
    fn expired_default_branch_is_only_listed() {
        let forks = BTreeMap::from([("up".to_owned(), fork(&[("main", Some((1, true)))], "up"))]);
        let plan = planner().plan(&forks, &PullRequests::new(), false);
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].destination, None);
        assert!(plan.items[0].build.is_some());
        assert!(plan.status.records().is_empty());
    }

    #[test]
    fn closed_pull_request_suppresses_branch_but_keeps_comment_url() {
        let closed = pr(9, "alice:feature", PrState::Closed, 3);
        let pulls = PullRequests::from([("alice:feature".to_owned(), closed.clone())]);

        let plan = planner().plan(&forks(), &pulls, false);

        assert!(!names(&plan).contains(&"alice:feature".to_owned()));
        assert!(plan.status.records().contains(&StatusRecord {
            publish_url: None,
            commit_sha: None,
            comments_url: Some(closed.comments_url),
        }));
    }

    #[test]
    fn closed_pull_request_never_suppresses_the_default_branch() {
        let pulls = PullRequests::from([("up:main".to_owned(), pr(1, "up:main", PrState::Closed, 3))]);
        let plan = planner().plan(&forks(), &pulls, false);
        assert_eq!(plan.items[0].destination, Some(Destination::Root));
    }

    #[test]
    fn published_branches_get_full_status_records() {
        let open = pr(8, "bob:fix", PrState::Open, 3);
        let pulls = PullRequests::from([("bob:fix".to_owned(), open.clone())]);

        let plan = planner().plan(&forks(), &pulls, false);

        assert_eq!(
            plan.status.records(),
            [
                StatusRecord {
                    publish_url: Some(SITE.to_owned()),
                    commit_sha: Some("sha1".to_owned()),
                    comments_url: None,
                },
                StatusRecord {
                    publish_url: Some("https://up.github.io/repo/branches/up/zeta/".to_owned()),
                    commit_sha: Some("sha5".to_owned()),
                    comments_url: None,
                },
                StatusRecord {
                    publish_url: Some("https://up.github.io/repo/branches/alice/feature/".to_owned()),
                    commit_sha: Some("sha4".to_owned()),
                    comments_url: None,
                },
                StatusRecord {
                    publish_url: Some("https://up.github.io/repo/branches/bob/fix/".to_owned()),
                    commit_sha: Some("sha3".to_owned()),
                    comments_url: Some(open.comments_url),
                },
            ]
        );
    }

    #[test]
    fn planning_is_idempotent() {
        let pulls = PullRequests::from([("bob:fix".to_owned(), pr(8, "bob:fix", PrState::Open, 3))]);
        let first = planner().plan(&forks(), &pulls, false);
        let second = planner().plan(&forks(), &pulls, false);
        assert_eq!(first, second);
    }

    #[test]
    fn destination_paths() {
        let nested = Destination::Branch {
            org: "alice".to_owned(),
            branch: "feature/x".to_owned(),
        };
        assert_eq!(
            nested.dir(Path::new("/site")),
            Path::new("/site/branches/alice/feature/x")
        );
        assert_eq!(nested.index_href(&SITE_URL), "alice/feature/x/");
        assert_eq!(Destination::Root.index_href(&SITE_URL), "../");

        let bare = Url::parse("https://x.io/r").unwrap();
        assert_eq!(Destination::Root.publish_url(&bare), "https://x.io/r/");
        assert_eq!(nested.publish_url(&bare), "https://x.io/r/branches/alice/feature/x/");
    }

    #[test]
    fn branch_names_are_percent_encoded_in_urls() {
        let odd = Destination::Branch {
            org: "alice".to_owned(),
            branch: "fix#2/100%".to_owned(),
        };
        assert_eq!(
            odd.publish_url(&SITE_URL),
            "https://up.github.io/repo/branches/alice/fix%232/100%25/"
        );
        assert_eq!(odd.index_href(&SITE_URL), "alice/fix%232/100%25/");
        assert_eq!(odd.site_path(), "branches/alice/fix#2/100%/");
    }

    #[test]
    fn unpublished_branch_with_pull_request_gets_comment_record() {
        let open = pr(7, "up:stale", PrState::Open, 3);
        let pulls = PullRequests::from([("up:stale".to_owned(), open.clone())]);

        let plan = planner().plan(&forks(), &pulls, false);

        let stale = plan.items.iter().find(|item| item.name == "stale").unwrap();
        assert_eq!(stale.destination, None);
        assert!(plan.status.records().contains(&StatusRecord {
            publish_url: None,
            commit_sha: None,
            comments_url: Some(open.comments_url),
        }));
    }
}
