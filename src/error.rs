//! Errors shared across the crate.

use reqwest::StatusCode;

/// An error returned by the GitHub REST API transport.
///
/// Not-found and forbidden responses get their own variants so callers can tell an
/// absent resource (a deleted fork) or a missing permission apart from a real failure.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server answered `404 Not Found`.
    #[error("{url} not found")]
    NotFound {
        /// The requested url.
        url: String,
    },
    /// The server answered `403 Forbidden`.
    #[error("access to {url} forbidden")]
    Forbidden {
        /// The requested url.
        url: String,
    },
    /// The server answered with any other unsuccessful status.
    #[error("request to {url} failed: {status}")]
    Status {
        /// The requested url.
        url: String,
        /// The status the server answered with.
        status: StatusCode,
    },
    /// The response body did not have the expected shape.
    #[error("failed to parse data from {url}: {source}")]
    Decode {
        /// The requested url.
        url: String,
        /// The underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// A url could not be built.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl {
        /// The offending url.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The request could not be sent or its body could not be read.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Builds an [`ApiError`] from an unsuccessful status code.
    pub fn from_status(url: &str, status: StatusCode) -> Self {
        let url = url.to_owned();
        match status {
            StatusCode::NOT_FOUND => Self::NotFound { url },
            StatusCode::FORBIDDEN => Self::Forbidden { url },
            status => Self::Status { url, status },
        }
    }

    /// Whether the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the token lacks permission for the request.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}

/// A fatal, user-actionable misconfiguration.
///
/// Each message is reported on its own line as a `::error::` annotation.
#[derive(Debug, thiserror::Error)]
#[error("{}", .messages.join(" "))]
pub struct ConfigurationError {
    /// The user-facing messages, in reporting order.
    pub messages: Vec<String>,
}

impl ConfigurationError {
    /// Creates a [`ConfigurationError`] with a single message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    /// Appends another message line.
    #[must_use]
    pub fn with(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// Renders the messages as workflow-command annotations, one per line.
    pub fn annotations(&self) -> impl Iterator<Item = String> + '_ {
        self.messages.iter().map(|message| format!("::error::{message}"))
    }
}
