//! A typed client for the GitHub REST API.
//!
//! Every `GET` goes through a short-lived in-memory cache, so repeated lookups of the same page
//! within one run see consistent data. Connection failures and timeouts are retried up to the
//! configured limit; every other unsuccessful status is returned as an [`ApiError`].

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use futures::{Stream, TryStreamExt as _, stream};
use parking_lot::Mutex;
use reqwest::{
    Method, RequestBuilder, Response, Url,
    header::{self, HeaderMap},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, trace, warn};

use crate::{error::ApiError, framework::retry_if_possible, workflow::artifact::Artifact};

mod models;

pub use models::*;

/// The root of the GitHub REST API.
pub const API: &str = "https://api.github.com";

/// The media type of GitHub's JSON responses.
pub const GITHUB_JSON: &str = "application/vnd.github+json";

/// How long a cached `GET` response stays fresh.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

const PER_PAGE: &str = "100";

/// The listings the core needs from the hosting platform.
///
/// Implemented by [`GitHubApi`]; tests substitute an in-memory forge.
pub trait Forge {
    /// Lists every branch of the repository `full_name` (`owner/name`).
    ///
    /// Fails with [`ApiError::NotFound`] if the repository no longer exists.
    fn list_branches(
        &self,
        full_name: &str,
    ) -> impl Future<Output = Result<Vec<BranchInfo>, ApiError>> + Send;

    /// Lists the artifacts of a workflow run, given the run's `artifacts_url`.
    fn list_artifacts(
        &self,
        artifacts_url: &str,
    ) -> impl Future<Output = Result<Vec<Artifact>, ApiError>> + Send;
}

#[derive(Debug, Clone)]
struct Page {
    body: String,
    next: Option<String>,
}

impl Page {
    fn items<T: DeserializeOwned>(&self, url: &str, item_key: Option<&str>) -> Result<Vec<T>, ApiError> {
        let decode = |source| ApiError::Decode {
            url: url.to_owned(),
            source,
        };
        match item_key {
            None => serde_json::from_str(&self.body).map_err(decode),
            Some(key) => {
                let mut value: serde_json::Value =
                    serde_json::from_str(&self.body).map_err(decode)?;
                let items = value
                    .get_mut(key)
                    .map(serde_json::Value::take)
                    .unwrap_or_default();
                serde_json::from_value(items).map_err(decode)
            }
        }
    }
}

/// A client of GitHub REST API, authenticated with a bearer token.
#[derive(Debug)]
pub struct GitHubApi {
    client: reqwest::Client,
    token: String,
    max_retries: u8,
    cache: Mutex<HashMap<String, (Instant, Page)>>,
}

impl GitHubApi {
    /// Creates a client authenticating with `token`.
    pub fn new(token: impl Into<String>, max_retries: u8) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            max_retries,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The retry limit this client was created with.
    pub fn max_retries(&self) -> u8 {
        self.max_retries
    }

    /// Builds a url below [`API`] with the given query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if `path` does not form a valid url.
    pub fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ApiError> {
        let url = format!("{API}{path}");
        if params.is_empty() {
            parse_url(&url)
        } else {
            Url::parse_with_params(&url, params).map_err(|err| ApiError::InvalidUrl {
                url,
                reason: err.to_string(),
            })
        }
    }

    /// Builds a request for GitHub REST API.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.request_accepting(method, url, GITHUB_JSON)
    }

    /// Builds a request for GitHub REST API that accepts the given media type.
    pub fn request_accepting(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(header::ACCEPT, accept)
            .bearer_auth(&self.token)
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header(
                header::USER_AGENT,
                concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            )
    }

    async fn send<F>(&self, url: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retry: u8 = 0;
        loop {
            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => return Err(ApiError::from_status(url, response.status())),
                Err(err)
                    if (err.is_connect() || err.is_timeout())
                        && retry_if_possible(&mut retry, self.max_retries).is_ok() =>
                {
                    warn!("failed to reach {url}: {err}");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn cached(&self, url: &str) -> Option<Page> {
        let cache = self.cache.lock();
        cache
            .get(url)
            .filter(|(fetched_at, _)| fetched_at.elapsed() < CACHE_TTL)
            .map(|(_, page)| page.clone())
    }

    async fn get_page(&self, url: &str) -> Result<Page, ApiError> {
        if let Some(page) = self.cached(url) {
            trace!("using cached response for {url}");
            return Ok(page);
        }

        debug!("fetching {url}…");
        let response = self.send(url, || self.request(Method::GET, url)).await?;
        let next = next_link(response.headers());
        let page = Page {
            body: response.text().await?,
            next,
        };

        self.cache
            .lock()
            .insert(url.to_owned(), (Instant::now(), page.clone()));
        Ok(page)
    }

    /// Fetches and deserializes a single resource.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the body does not deserialize to `T`.
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let page = self.get_page(url).await?;
        serde_json::from_str(&page.body).map_err(|source| ApiError::Decode {
            url: url.to_owned(),
            source,
        })
    }

    /// Lazily walks every page of a listing, following `Link: rel="next"` until exhausted.
    ///
    /// Items are read from the top-level array, or from the array under `item_key` for
    /// endpoints that wrap their results in an object. Pages are fetched one at a time, so
    /// the listing order of the endpoint is preserved.
    pub fn paginate<'a, T>(
        &'a self,
        mut url: Url,
        item_key: Option<&'a str>,
    ) -> impl Stream<Item = Result<T, ApiError>> + Send + 'a
    where
        T: DeserializeOwned + Send + 'a,
    {
        url.query_pairs_mut().append_pair("per_page", PER_PAGE);

        stream::try_unfold(Some(url.to_string()), move |next| async move {
            let Some(url) = next else {
                return Ok::<_, ApiError>(None);
            };
            let page = self.get_page(&url).await?;
            let items = page.items::<T>(&url, item_key)?;
            Ok(Some((stream::iter(items.into_iter().map(Ok::<T, ApiError>)), page.next)))
        })
        .try_flatten()
    }

    /// Sends `body` as JSON with the given method and deserializes the response.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails or the body does not deserialize to `T`.
    pub async fn send_json<B, T>(&self, method: Method, url: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        debug!("sending {method} to {url}…");
        let response = self
            .send(url, || self.request(method.clone(), url).json(body))
            .await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|source| ApiError::Decode {
            url: url.to_owned(),
            source,
        })
    }
}

impl Forge for GitHubApi {
    async fn list_branches(&self, full_name: &str) -> Result<Vec<BranchInfo>, ApiError> {
        let url = self.url(&format!("/repos/{full_name}/branches"), &[])?;
        self.paginate(url, None).try_collect().await
    }

    async fn list_artifacts(&self, artifacts_url: &str) -> Result<Vec<Artifact>, ApiError> {
        let url = parse_url(artifacts_url)?;
        self.paginate(url, Some("artifacts")).try_collect().await
    }
}

/// Parses an absolute url handed out by the API.
///
/// # Errors
///
/// Returns [`ApiError::InvalidUrl`] if `url` is not a valid url.
pub fn parse_url(url: &str) -> Result<Url, ApiError> {
    Url::parse(url).map_err(|err| ApiError::InvalidUrl {
        url: url.to_owned(),
        reason: err.to_string(),
    })
}

/// Finds the `rel="next"` target of a `Link` header.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|link| {
            let (target, params) = link.split_once(';')?;
            params
                .split(';')
                .any(|param| matches!(param.trim(), r#"rel="next""# | "rel=next"))
                .then(|| {
                    target
                        .trim()
                        .trim_start_matches('<')
                        .trim_end_matches('>')
                        .to_owned()
                })
        })
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;
    use crate::workflow::WorkflowRun;

    #[test]
    fn finds_next_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::LINK,
            HeaderValue::from_static(
                r#"<https://api.github.com/repositories/1/pulls?page=1>; rel="prev", <https://api.github.com/repositories/1/pulls?page=3>; rel="next", <https://api.github.com/repositories/1/pulls?page=9>; rel="last""#,
            ),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://api.github.com/repositories/1/pulls?page=3")
        );
    }

    #[test]
    fn last_page_has_no_next_link() {
        let mut headers = HeaderMap::new();
        assert_eq!(next_link(&headers), None);
        headers.insert(
            header::LINK,
            HeaderValue::from_static(r#"<https://api.github.com/x?page=1>; rel="first""#),
        );
        assert_eq!(next_link(&headers), None);
    }

    #[test]
    fn reads_items_nested_under_key() {
        let page = Page {
            body: r#"{"total_count": 1, "workflow_runs": [{
                "id": 7,
                "head_branch": "main",
                "head_sha": "abc",
                "html_url": "https://github.com/o/r/actions/runs/7",
                "artifacts_url": "https://api.github.com/repos/o/r/actions/runs/7/artifacts",
                "head_repository": null
            }]}"#
                .to_owned(),
            next: None,
        };
        let runs: Vec<WorkflowRun> = page.items("u", Some("workflow_runs")).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].head_repository, None);

        let missing = page.items::<WorkflowRun>("u", Some("artifacts")).unwrap_err();
        assert!(matches!(missing, ApiError::Decode { .. }));
    }

    #[test]
    fn runs_without_head_branch_decode() {
        let run = |id: u64, head_branch: &str| {
            format!(
                r#"{{"id": {id}, "head_branch": {head_branch}, "head_sha": "abc",
                "html_url": "https://github.com/o/r/actions/runs/{id}",
                "artifacts_url": "https://api.github.com/repos/o/r/actions/runs/{id}/artifacts",
                "head_repository": null}}"#
            )
        };
        let page = Page {
            body: format!(
                r#"{{"workflow_runs": [{}, {}]}}"#,
                run(2, "null"),
                run(1, r#""main""#)
            ),
            next: None,
        };
        let runs: Vec<WorkflowRun> = page.items("u", Some("workflow_runs")).unwrap();
        assert_eq!(runs[0].head_branch, None);
        assert_eq!(runs[1].head_branch.as_deref(), Some("main"));
    }

    #[test]
    fn reads_top_level_items() {
        let page = Page {
            body: r#"[{"name": "main", "commit": {"sha": "abc"}}]"#.to_owned(),
            next: None,
        };
        let branches: Vec<BranchInfo> = page.items("u", None).unwrap();
        assert_eq!(branches[0].name, "main");
    }

    #[test]
    fn builds_urls_with_params() {
        let api = GitHubApi::new("t", 0);
        let url = api
            .url("/repos/o/r/pulls", &[("state", "all")])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/repos/o/r/pulls?state=all");
    }
}
