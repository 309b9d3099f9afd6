//! Defines the environment variables to use.

use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use crate::error::ConfigurationError;

/// Parses a looked-up environment variable from [`String`] to something else, wrapping any error in [`anyhow::Error`].
///
/// Evaluates to [`None`] when the variable is unset.
#[macro_export]
macro_rules! parse_env {
    ($lookup:expr, $key:expr => |$var:ident| $expr:expr) => {
        $lookup($key).map(|$var| {
            $expr.map_err(|e| anyhow::anyhow!("invalid value for {}: {e}", $key))
        })
    };
}

pub use parse_env;

/// The default retry limit for requests and transactions.
pub const DEFAULT_MAX_RETRIES: u8 = 5;

/// A `owner/name` reference to a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    /// The owning user or organization.
    pub owner: String,
    /// The repository name.
    pub name: String,
}

impl FromStr for RepoRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                })
            }
            _ => Err(format!("expected `owner/name`, got `{s}`")),
        }
    }
}

impl Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Process configuration, read once at startup and passed to each component.
#[derive(Debug, Clone)]
pub struct Config {
    /// The GitHub token.
    pub token: String,
    /// The upstream repository (`GITHUB_REPOSITORY`).
    pub repository: RepoRef,
    /// The name of the workflow producing preview builds.
    pub workflow_name: Option<String>,
    /// The name of the artifact the workflow uploads.
    pub artifact_name: Option<String>,
    /// Whether debug logging was requested.
    pub debug: bool,
    /// The maximum retry limit for requests and transactions.
    pub max_retries: u8,
    /// Where the site is assembled.
    pub output_dir: PathBuf,
    /// Where status records are handed off between phases.
    pub status_file: PathBuf,
    /// The context of posted commit statuses.
    pub status_context: String,
    /// The file receiving step outputs, if running inside a workflow.
    pub github_output: Option<PathBuf>,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] naming every missing or malformed variable.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] naming every missing or malformed variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Vec::new();
        let mut required = |key: &str| {
            let value = lookup(key).filter(|value| !value.is_empty());
            if value.is_none() {
                problems.push(format!("{key} not set in environment"));
            }
            value
        };

        let token = required("GITHUB_TOKEN");
        let repository = required("GITHUB_REPOSITORY");

        let repository = repository.and_then(|repository| match repository.parse::<RepoRef>() {
            Ok(repository) => Some(repository),
            Err(err) => {
                problems.push(err);
                None
            }
        });

        let max_retries = match parse_env!(lookup, "MAX_RETRIES" => |s| s.parse::<u8>()) {
            Some(Ok(max_retries)) => max_retries,
            Some(Err(err)) => {
                problems.push(err.to_string());
                DEFAULT_MAX_RETRIES
            }
            None => DEFAULT_MAX_RETRIES,
        };

        let (Some(token), Some(repository)) = (token, repository) else {
            return Err(ConfigurationError { messages: problems });
        };
        if !problems.is_empty() {
            return Err(ConfigurationError { messages: problems });
        }

        let workflow_name = lookup("WORKFLOW_NAME").filter(|value| !value.is_empty());
        let status_context = lookup("STATUS_CONTEXT").unwrap_or_else(|| {
            format!(
                "{} / preview",
                workflow_name.as_deref().unwrap_or(env!("CARGO_PKG_NAME"))
            )
        });

        Ok(Self {
            token,
            repository,
            workflow_name,
            artifact_name: lookup("ARTIFACT_NAME").filter(|value| !value.is_empty()),
            debug: lookup("DEBUG").is_some_and(|value| is_truthy(&value)),
            max_retries,
            output_dir: lookup("OUTPUT_DIR").map_or_else(|| PathBuf::from("_build"), PathBuf::from),
            status_file: lookup("STATUS_FILE")
                .map_or_else(|| PathBuf::from("_status.jsonl"), PathBuf::from),
            status_context,
            github_output: lookup("GITHUB_OUTPUT")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        })
    }

    /// The workflow and artifact names, required to assemble the site.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if either is unset.
    pub fn build_names(&self) -> Result<(&str, &str), ConfigurationError> {
        match (&self.workflow_name, &self.artifact_name) {
            (Some(workflow), Some(artifact)) => Ok((workflow.as_str(), artifact.as_str())),
            (workflow, artifact) => Err(ConfigurationError {
                messages: [
                    workflow.is_none().then_some("WORKFLOW_NAME not set in environment"),
                    artifact.is_none().then_some("ARTIFACT_NAME not set in environment"),
                ]
                .into_iter()
                .flatten()
                .map(str::to_owned)
                .collect(),
            }),
        }
    }
}

/// Whether a flag-like variable such as `DEBUG` is switched on.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1")
}
