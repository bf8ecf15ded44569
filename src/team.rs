use crate::error::FetchError;
use crate::fetcher::FetchSettings;
use crate::github::GitHubSource;
use crate::retry;
use tokio_util::sync::CancellationToken;

/// Resolves the member logins of `org/team_slug`.
///
/// Team filtering is advisory: any failure, including a missing team or
/// organization, is logged and yields an empty list, which callers treat as
/// "no filter".
pub async fn fetch_team_members<S: GitHubSource>(
    source: &S,
    org: &str,
    team_slug: &str,
    settings: &FetchSettings,
    cancel: &CancellationToken,
) -> Vec<String> {
    tracing::info!(org, team = team_slug, "Fetching team members");

    match collect_members(source, org, team_slug, settings, cancel).await {
        Ok(members) => {
            tracing::info!(count = members.len(), "Found team members");
            members
        }
        Err(FetchError::Cancelled) => {
            tracing::debug!("Team member lookup cancelled");
            Vec::new()
        }
        Err(FetchError::Upstream(err)) => {
            tracing::warn!(org, team = team_slug, error = %err, "Failed to fetch team members. Showing all reviewers.");
            Vec::new()
        }
    }
}

async fn collect_members<S: GitHubSource>(
    source: &S,
    org: &str,
    team_slug: &str,
    settings: &FetchSettings,
    cancel: &CancellationToken,
) -> Result<Vec<String>, FetchError> {
    let mut members = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let cursor_ref = cursor.as_deref();
        let page = retry::with_backoff(&settings.retry, cancel, move || {
            source.team_member_page(org, team_slug, cursor_ref)
        })
        .await?;

        members.extend(page.items);

        match page.end_cursor {
            Some(next) if page.has_next_page => cursor = Some(next),
            _ => break,
        }

        retry::sleep(settings.page_delay, cancel).await?;
    }

    Ok(members)
}
