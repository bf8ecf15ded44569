//! Error taxonomy for the metrics pipeline.
//!
//! Transport failures are mapped once, here, into an [`UpstreamError`] whose
//! [`UpstreamErrorKind`] is all the retry logic ever looks at. The fetchers then
//! turn what survives the retries into a caller-facing [`PipelineError`].

use crate::types::WindowError;
use thiserror::Error;

/// How a failed upstream call should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// The credential was rejected.
    Unauthorized,
    /// The organization, repository or team does not exist.
    NotFound,
    /// Rate limiting or a gateway timeout; worth retrying.
    Transient,
    /// Anything else. Not retried.
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::NotFound, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == UpstreamErrorKind::Transient
    }

    /// Classifies an HTTP status returned by the API.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match status {
            401 => UpstreamErrorKind::Unauthorized,
            404 => UpstreamErrorKind::NotFound,
            429 | 502 | 504 => UpstreamErrorKind::Transient,
            // Secondary rate limits come back as 403.
            403 if message.to_lowercase().contains("rate limit") => UpstreamErrorKind::Transient,
            _ => UpstreamErrorKind::Other,
        };
        Self::new(kind, format!("HTTP {status}: {message}"))
    }

    /// Classifies an entry from the `errors` array of a GraphQL response.
    pub fn from_graphql(error_type: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match error_type {
            Some("NOT_FOUND") => UpstreamErrorKind::NotFound,
            Some("RATE_LIMITED") => UpstreamErrorKind::Transient,
            _ if message.to_lowercase().contains("timeout") => UpstreamErrorKind::Transient,
            _ => UpstreamErrorKind::Other,
        };
        Self::new(kind, message)
    }

    /// Classifies a failure that never produced a response.
    pub fn from_transport(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let kind = if lower.contains("timeout") || lower.contains("timed out") {
            UpstreamErrorKind::Transient
        } else {
            UpstreamErrorKind::Other
        };
        Self::new(kind, message)
    }
}

impl From<octocrab::Error> for UpstreamError {
    fn from(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } => {
                Self::from_status(source.status_code.as_u16(), source.message.clone())
            }
            other => Self::from_transport(other.to_string()),
        }
    }
}

/// Outcome of a single fetch step that did not yield data.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Failures surfaced to whoever invoked the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid GitHub token. Please check your token.")]
    InvalidCredential,
    #[error("Repository not found. Please check organization and repository names.")]
    RepositoryNotFound,
    #[error("GitHub API timeout. Try reducing the date range or the repository has too many PRs.")]
    Timeout,
    #[error("GitHub API error: {0}")]
    Upstream(String),
    #[error("No pull requests found in the specified date range.")]
    NoPullRequests,
    #[error("Request cancelled")]
    Cancelled,
    #[error(transparent)]
    InvalidWindow(#[from] WindowError),
    #[error("Failed to create GitHub client: {0}")]
    Client(String),
}

impl PipelineError {
    /// True when the caller aborted; such outcomes should not be shown as errors.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for the "nothing to show" outcome.
    pub fn is_empty_result(&self) -> bool {
        matches!(self, Self::NoPullRequests)
    }
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => Self::Cancelled,
            FetchError::Upstream(upstream) => match upstream.kind {
                UpstreamErrorKind::Unauthorized => Self::InvalidCredential,
                UpstreamErrorKind::NotFound => Self::RepositoryNotFound,
                UpstreamErrorKind::Transient => Self::Timeout,
                UpstreamErrorKind::Other => Self::Upstream(upstream.message),
            },
        }
    }
}
