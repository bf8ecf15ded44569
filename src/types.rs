//! Domain types shared by the fetchers, the aggregator and the HTTP layer.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a pull request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

/// Verdict carried by a single review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
}

/// A GitHub account. Absent when the account has been deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub author: Option<Actor>,
    pub state: ReviewState,
    pub created_at: DateTime<Utc>,
    /// `None` for reviews that are still pending.
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Lifecycle events requested alongside each pull request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum TimelineEvent {
    ReadyForReviewEvent {
        #[serde(rename = "createdAt")]
        created_at: DateTime<Utc>,
    },
    ReviewRequestedEvent {
        #[serde(rename = "createdAt")]
        created_at: DateTime<Utc>,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: PrState,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub author: Option<Actor>,
    pub reviews: Vec<Review>,
    /// Total reviews reported upstream; may exceed `reviews.len()`.
    pub review_count: u64,
    pub review_request_count: u64,
    pub comment_count: u64,
    pub timeline: Vec<TimelineEvent>,
}

impl PullRequest {
    pub fn author_login(&self) -> Option<&str> {
        self.author.as_ref().map(|a| a.login.as_str())
    }

    /// The moment the PR left draft status, if it ever did.
    ///
    /// Only the first such event is considered.
    pub fn ready_for_review_at(&self) -> Option<DateTime<Utc>> {
        self.timeline.iter().find_map(|event| match event {
            TimelineEvent::ReadyForReviewEvent { created_at } => Some(*created_at),
            _ => None,
        })
    }
}

/// One page of a cursor-paginated listing.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Inclusive creation-time window for the pull requests to analyse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("Please specify either a date range or number of days.")]
    Missing,
    #[error("The start of the date range must not be after its end.")]
    Inverted,
    #[error("The number of days is too large.")]
    OutOfRange,
}

impl TimeWindow {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self, WindowError> {
        if since > until {
            return Err(WindowError::Inverted);
        }
        Ok(Self { since, until })
    }

    /// The trailing `days` ending at `now`.
    pub fn from_days(days: u32, now: DateTime<Utc>) -> Result<Self, WindowError> {
        let since = Duration::try_days(i64::from(days))
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or(WindowError::OutOfRange)?;
        Ok(Self { since, until: now })
    }

    /// From the start of `start` through the last millisecond of `end`.
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        let since = start.and_time(NaiveTime::MIN).and_utc();
        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        let until = end.and_time(end_of_day).and_utc();
        Self::new(since, until)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.since && at <= self.until
    }
}

/// Caller-supplied GitHub token. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Everything the pipeline needs for one invocation.
#[derive(Clone, Debug)]
pub struct MetricsRequest {
    pub org: String,
    pub repo: String,
    pub credential: Credential,
    pub window: TimeWindow,
    /// Team slug used to narrow the reviewer list.
    pub team: Option<String>,
}

impl fmt::Display for MetricsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.repo)
    }
}
