//! Service layer that runs the metrics pipeline for one request.
//!
//! `MetricsQuerier` is the entry point used by the HTTP handlers. For each
//! request it:
//! 1. Builds a GitHub client for the caller's credential.
//! 2. Fetches the pull requests created within the window.
//! 3. Resolves the team's members when a team filter was given.
//! 4. Aggregates everything into a [`PrMetrics`] report.
//!
//! Nothing is kept between requests.

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::fetcher::{self, FetchSettings};
use crate::github::{GitHubClient, GitHubSource};
use crate::metrics::{self, PrMetrics};
use crate::team;
use crate::types::MetricsRequest;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct MetricsQuerier {
    github_api_url: String,
    request_timeout: Duration,
    settings: FetchSettings,
}

impl MetricsQuerier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            github_api_url: config.github_api_url.clone(),
            request_timeout: config.request_timeout(),
            settings: config.fetch_settings(),
        }
    }

    /// Runs the pipeline against the GitHub API using the request's credential.
    pub async fn query(
        &self,
        request: &MetricsRequest,
        cancel: &CancellationToken,
    ) -> Result<PrMetrics, PipelineError> {
        let client = GitHubClient::new(
            &self.github_api_url,
            request.credential.expose(),
            self.request_timeout,
        )
        .map_err(|e| PipelineError::Client(format!("{e:#}")))?;

        run_pipeline(&client, request, &self.settings, cancel).await
    }
}

/// Fetches, optionally filters by team, and aggregates.
///
/// Steps run strictly one after another. An empty pull request list is
/// reported as [`PipelineError::NoPullRequests`]; a cancelled token always
/// ends in [`PipelineError::Cancelled`], even if the team lookup swallowed it.
pub async fn run_pipeline<S: GitHubSource>(
    source: &S,
    request: &MetricsRequest,
    settings: &FetchSettings,
    cancel: &CancellationToken,
) -> Result<PrMetrics, PipelineError> {
    let prs = fetcher::fetch_pull_requests(
        source,
        &request.org,
        &request.repo,
        request.window,
        settings,
        cancel,
    )
    .await?;

    if prs.is_empty() {
        tracing::info!(repo = %request, "No pull requests in window");
        return Err(PipelineError::NoPullRequests);
    }

    let team_members = match request.team.as_deref() {
        Some(team) => team::fetch_team_members(source, &request.org, team, settings, cancel).await,
        None => Vec::new(),
    };

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let report = metrics::aggregate(&prs, request.window, &team_members);
    tracing::info!(
        repo = %request,
        prs = report.total_prs,
        reviewers = report.reviewers.len(),
        team_filter = report.team_filter,
        "Computed review metrics"
    );

    Ok(report)
}
