use crate::error::UpstreamError;
use crate::types::{Actor, Page, PrState, PullRequest, Review, TimelineEvent};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use octocrab::service::middleware::retry::RetryConfig;
use octocrab::Octocrab;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;

const PULL_REQUESTS_QUERY: &str = r#"
query FetchPullRequests($owner: String!, $repo: String!, $cursor: String, $limit: Int!) {
  repository(owner: $owner, name: $repo) {
    pullRequests(first: $limit, after: $cursor, orderBy: { field: CREATED_AT, direction: DESC }) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        title
        state
        createdAt
        mergedAt
        closedAt
        updatedAt
        author { login }
        reviews(first: 50) {
          totalCount
          nodes { author { login } state createdAt submittedAt }
        }
        reviewRequests(first: 10) { totalCount }
        comments { totalCount }
        timelineItems(first: 50, itemTypes: [REVIEW_REQUESTED_EVENT, READY_FOR_REVIEW_EVENT]) {
          nodes {
            __typename
            ... on ReadyForReviewEvent { createdAt }
            ... on ReviewRequestedEvent { createdAt }
          }
        }
      }
    }
  }
}
"#;

const TEAM_MEMBERS_QUERY: &str = r#"
query FetchTeamMembers($org: String!, $teamSlug: String!, $cursor: String) {
  organization(login: $org) {
    team(slug: $teamSlug) {
      members(first: 100, after: $cursor) {
        pageInfo { hasNextPage endCursor }
        nodes { login }
      }
    }
  }
}
"#;

/// Read access to the two paginated listings the pipeline needs.
///
/// Implemented by [`GitHubClient`] for the real API and by in-memory fakes in tests.
pub trait GitHubSource {
    /// One page of a repository's pull requests, newest first.
    fn pull_request_page(
        &self,
        owner: &str,
        repo: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> impl Future<Output = Result<Page<PullRequest>, UpstreamError>> + Send;

    /// One page of a team's member logins.
    fn team_member_page(
        &self,
        org: &str,
        team_slug: &str,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page<String>, UpstreamError>> + Send;
}

/// GraphQL client for the GitHub v4 API.
#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
}

impl GitHubClient {
    pub fn new(base_uri: &str, token: &str, timeout: Duration) -> Result<Self> {
        let octocrab = Octocrab::builder()
            .base_uri(base_uri)
            .with_context(|| format!("Invalid GitHub API URL: {base_uri}"))?
            .personal_token(token.to_string())
            // Retries are owned by `retry::with_backoff`.
            .add_retry_config(RetryConfig::None)
            .set_read_timeout(Some(timeout))
            .build()
            .context("Failed to build GitHub client")?;

        Ok(Self { octocrab })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, UpstreamError> {
        let payload = json!({ "query": query, "variables": variables });
        let response = self.octocrab._post("/graphql", Some(&payload)).await?;
        let status = response.status();
        let body = self.octocrab.body_to_string(response).await?;

        // Gateway failures arrive as HTML or bare GraphQL errors, so the status
        // decides before the body is decoded.
        if !status.is_success() {
            return Err(UpstreamError::from_status(status.as_u16(), error_message(&body)));
        }

        let response: GraphQlResponse<T> = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::from_transport(format!("Malformed GitHub response: {e}")))?;

        if let Some(error) = response.errors.as_deref().and_then(|errors| errors.first()) {
            return Err(UpstreamError::from_graphql(
                error.error_type.as_deref(),
                error.message.clone(),
            ));
        }

        response
            .data
            .ok_or_else(|| UpstreamError::from_transport("GitHub returned no data"))
    }
}

impl GitHubSource for GitHubClient {
    async fn pull_request_page(
        &self,
        owner: &str,
        repo: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<PullRequest>, UpstreamError> {
        let data: RepositoryData = self
            .query(
                PULL_REQUESTS_QUERY,
                json!({ "owner": owner, "repo": repo, "cursor": cursor, "limit": page_size }),
            )
            .await?;

        let connection = data
            .repository
            .ok_or_else(|| UpstreamError::not_found(format!("Repository {owner}/{repo} not found")))?
            .pull_requests;

        Ok(Page {
            items: connection.nodes.into_iter().map(PullRequest::from).collect(),
            has_next_page: connection.page_info.has_next_page,
            end_cursor: connection.page_info.end_cursor,
        })
    }

    async fn team_member_page(
        &self,
        org: &str,
        team_slug: &str,
        cursor: Option<&str>,
    ) -> Result<Page<String>, UpstreamError> {
        let data: OrganizationData = self
            .query(
                TEAM_MEMBERS_QUERY,
                json!({ "org": org, "teamSlug": team_slug, "cursor": cursor }),
            )
            .await?;

        let members = data
            .organization
            .and_then(|organization| organization.team)
            .ok_or_else(|| UpstreamError::not_found(format!("Team {org}/{team_slug} not found")))?
            .members;

        Ok(Page {
            items: members.nodes.into_iter().map(|actor| actor.login).collect(),
            has_next_page: members.page_info.has_next_page,
            end_cursor: members.page_info.end_cursor,
        })
    }
}

/// Best human-readable message in an error body: the REST `message`, the first
/// GraphQL error, or the raw text.
fn error_message(body: &str) -> String {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = json.as_ref().and_then(|json| {
        json.get("message")
            .or_else(|| json.pointer("/errors/0/message"))
            .and_then(serde_json::Value::as_str)
    });

    match message {
        Some(message) => message.to_string(),
        None => body.trim().chars().take(200).collect(),
    }
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    page_info: PageInfo,
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Counted<T> {
    total_count: u64,
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryData {
    repository: Option<RepositoryNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    pull_requests: Connection<PullRequestNode>,
}

#[derive(Deserialize)]
struct OrganizationData {
    organization: Option<OrganizationNode>,
}

#[derive(Deserialize)]
struct OrganizationNode {
    team: Option<TeamNode>,
}

#[derive(Deserialize)]
struct TeamNode {
    members: Connection<Actor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    number: u64,
    title: String,
    state: PrState,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    author: Option<Actor>,
    reviews: Counted<Review>,
    review_requests: Counted<serde::de::IgnoredAny>,
    comments: Counted<serde::de::IgnoredAny>,
    timeline_items: Nodes<TimelineEvent>,
}

impl From<PullRequestNode> for PullRequest {
    fn from(node: PullRequestNode) -> Self {
        Self {
            number: node.number,
            title: node.title,
            state: node.state,
            created_at: node.created_at,
            merged_at: node.merged_at,
            closed_at: node.closed_at,
            updated_at: node.updated_at,
            author: node.author,
            review_count: node.reviews.total_count,
            reviews: node.reviews.nodes,
            review_request_count: node.review_requests.total_count,
            comment_count: node.comments.total_count,
            timeline: node.timeline_items.nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamErrorKind;
    use crate::types::ReviewState;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(&server.uri(), "test_token", Duration::from_secs(5)).unwrap()
    }

    fn pull_request_json() -> serde_json::Value {
        json!({
            "number": 7,
            "title": "Add feature",
            "state": "MERGED",
            "createdAt": "2024-01-05T10:00:00Z",
            "mergedAt": "2024-01-06T10:00:00Z",
            "closedAt": "2024-01-06T10:00:00Z",
            "updatedAt": "2024-01-06T10:00:00Z",
            "author": { "login": "carol" },
            "reviews": {
                "totalCount": 2,
                "nodes": [
                    { "author": { "login": "alice" }, "state": "APPROVED",
                      "createdAt": "2024-01-05T12:00:00Z", "submittedAt": "2024-01-05T12:00:00Z" },
                    { "author": null, "state": "PENDING",
                      "createdAt": "2024-01-05T13:00:00Z", "submittedAt": null }
                ]
            },
            "reviewRequests": { "totalCount": 1 },
            "comments": { "totalCount": 4 },
            "timelineItems": { "nodes": [
                { "__typename": "ReadyForReviewEvent", "createdAt": "2024-01-05T11:00:00Z" }
            ] }
        })
    }

    #[tokio::test]
    async fn test_pull_request_page_decoding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "repository": { "pullRequests": {
                    "pageInfo": { "hasNextPage": true, "endCursor": "abc" },
                    "nodes": [pull_request_json()]
                } } }
            })))
            .mount(&server)
            .await;

        let page = client(&server)
            .pull_request_page("acme", "widgets", None, 50)
            .await
            .unwrap();

        assert!(page.has_next_page);
        assert_eq!(page.end_cursor.as_deref(), Some("abc"));
        let pr = &page.items[0];
        assert_eq!(pr.number, 7);
        assert_eq!(pr.state, PrState::Merged);
        assert_eq!(pr.review_count, 2);
        assert_eq!(pr.comment_count, 4);
        assert_eq!(pr.review_request_count, 1);
        assert_eq!(pr.reviews[0].state, ReviewState::Approved);
        assert!(pr.reviews[1].author.is_none());
        assert!(pr.reviews[1].submitted_at.is_none());
        assert!(pr.ready_for_review_at().is_some());
    }

    #[tokio::test]
    async fn test_unauthorized_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "Bad credentials",
                "documentation_url": "https://docs.github.com/graphql"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .pull_request_page("acme", "widgets", None, 50)
            .await
            .unwrap_err();

        assert_eq!(err.kind, UpstreamErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_bad_gateway_html_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(
                ResponseTemplate::new(502).set_body_string("<html><body>Bad Gateway</body></html>"),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .pull_request_page("acme", "widgets", None, 50)
            .await
            .unwrap_err();

        assert_eq!(err.kind, UpstreamErrorKind::Transient);
        assert!(err.message.starts_with("HTTP 502"));
    }

    #[tokio::test]
    async fn test_gateway_timeout_with_graphql_errors_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(504).set_body_json(json!({
                "data": null,
                "errors": [{ "message": "We couldn't respond to your request in time. Sorry about that. timeout" }]
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .pull_request_page("acme", "widgets", None, 50)
            .await
            .unwrap_err();

        assert_eq!(err.kind, UpstreamErrorKind::Transient);
        assert!(err.message.contains("couldn't respond"));
    }

    #[tokio::test]
    async fn test_graphql_timeout_message_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{ "message": "Something went wrong: timeout while resolving pullRequests" }]
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .pull_request_page("acme", "widgets", None, 50)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message":"Bad credentials"}"#), "Bad credentials");
        assert_eq!(error_message(r#"{"errors":[{"message":"boom"}]}"#), "boom");
        assert_eq!(error_message("  <html>oops</html>\n"), "<html>oops</html>");
    }

    #[tokio::test]
    async fn test_graphql_not_found_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "repository": null },
                "errors": [{
                    "type": "NOT_FOUND",
                    "path": ["repository"],
                    "message": "Could not resolve to a Repository with the name 'acme/nope'."
                }]
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .pull_request_page("acme", "nope", None, 50)
            .await
            .unwrap_err();

        assert_eq!(err.kind, UpstreamErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_missing_team_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "organization": { "team": null } }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .team_member_page("acme", "ghosts", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind, UpstreamErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_team_member_page_decoding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "organization": { "team": { "members": {
                    "pageInfo": { "hasNextPage": false, "endCursor": null },
                    "nodes": [{ "login": "alice" }, { "login": "bob" }]
                } } } }
            })))
            .mount(&server)
            .await;

        let page = client(&server)
            .team_member_page("acme", "core", None)
            .await
            .unwrap();

        assert_eq!(page.items, vec!["alice".to_string(), "bob".to_string()]);
        assert!(!page.has_next_page);
    }
}
