use crate::error::PipelineError;
use crate::github::GitHubSource;
use crate::retry::{self, RetryPolicy};
use crate::types::{PullRequest, TimeWindow};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Paging and throttling knobs shared by both fetchers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchSettings {
    pub page_size: u32,
    /// Pause between consecutive page requests.
    pub page_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            page_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

/// Collects every pull request of `owner/repo` created within `window`.
///
/// Pages are requested newest first, so paging stops as soon as a page reaches
/// back past `window.since`. The result keeps the server's ordering.
pub async fn fetch_pull_requests<S: GitHubSource>(
    source: &S,
    owner: &str,
    repo: &str,
    window: TimeWindow,
    settings: &FetchSettings,
    cancel: &CancellationToken,
) -> Result<Vec<PullRequest>, PipelineError> {
    tracing::info!(owner, repo, since = %window.since, until = %window.until, "Fetching pull requests");

    let mut prs = Vec::new();
    let mut cursor: Option<String> = None;
    let mut page_number = 0u32;

    loop {
        page_number += 1;
        let cursor_ref = cursor.as_deref();
        let page_size = settings.page_size;

        let page = retry::with_backoff(&settings.retry, cancel, move || {
            source.pull_request_page(owner, repo, cursor_ref, page_size)
        })
        .await
        .map_err(|err| {
            tracing::error!(owner, repo, page = page_number, error = %err, "Failed to fetch pull requests");
            PipelineError::from(err)
        })?;

        let oldest = page.items.iter().map(|pr| pr.created_at).min();
        prs.extend(page.items.into_iter().filter(|pr| window.contains(pr.created_at)));
        tracing::info!(page = page_number, in_window = prs.len(), "Fetched pull request page");

        if oldest.is_some_and(|created_at| created_at < window.since) {
            tracing::debug!("Reached pull requests older than the window, stopping");
            break;
        }
        if !page.has_next_page {
            break;
        }
        let Some(next) = page.end_cursor else {
            tracing::warn!(page = page_number, "More pages reported but no cursor returned");
            break;
        };
        cursor = Some(next);

        retry::sleep(settings.page_delay, cancel).await?;
    }

    Ok(prs)
}
