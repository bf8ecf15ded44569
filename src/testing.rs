//! In-memory GitHub stand-in and fixture builders for unit tests.

use crate::error::UpstreamError;
use crate::github::GitHubSource;
use crate::types::{Actor, Page, PrState, PullRequest, Review, ReviewState, TimelineEvent};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A timestamp in January 2024.
pub(crate) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

pub(crate) fn pr(number: u64, created_at: DateTime<Utc>, state: PrState) -> PullRequest {
    PullRequest {
        number,
        title: format!("PR #{number}"),
        state,
        created_at,
        merged_at: None,
        closed_at: None,
        updated_at: created_at,
        author: Some(Actor {
            login: "author".to_string(),
        }),
        reviews: Vec::new(),
        review_count: 0,
        review_request_count: 0,
        comment_count: 0,
        timeline: Vec::new(),
    }
}

pub(crate) fn review(login: &str, state: ReviewState, submitted_at: Option<DateTime<Utc>>) -> Review {
    Review {
        author: Some(Actor {
            login: login.to_string(),
        }),
        state,
        created_at: submitted_at.unwrap_or_else(|| at(1, 0)),
        submitted_at,
    }
}

pub(crate) fn with_reviews(mut pr: PullRequest, reviews: Vec<Review>) -> PullRequest {
    pr.review_count = reviews.len() as u64;
    pr.reviews = reviews;
    pr
}

pub(crate) fn ready_for_review(at: DateTime<Utc>) -> TimelineEvent {
    TimelineEvent::ReadyForReviewEvent { created_at: at }
}

/// Serves canned pages. Cursors are page indexes rendered as strings.
#[derive(Default)]
pub(crate) struct FakeSource {
    pr_pages: Vec<Vec<PullRequest>>,
    team_pages: Vec<Vec<String>>,
    team_failure: Option<UpstreamError>,
    failures: Mutex<VecDeque<UpstreamError>>,
    pr_calls: Mutex<Vec<Option<String>>>,
    team_calls: Mutex<Vec<Option<String>>>,
}

impl FakeSource {
    pub(crate) fn with_pr_pages(pages: Vec<Vec<PullRequest>>) -> Self {
        Self {
            pr_pages: pages,
            ..Default::default()
        }
    }

    pub(crate) fn team(mut self, pages: Vec<Vec<&str>>) -> Self {
        self.team_pages = pages
            .into_iter()
            .map(|page| page.into_iter().map(str::to_string).collect())
            .collect();
        self
    }

    pub(crate) fn team_failing(mut self, err: UpstreamError) -> Self {
        self.team_failure = Some(err);
        self
    }

    /// Queues a failure returned by the next pull request call.
    pub(crate) fn fail_next(&self, err: UpstreamError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub(crate) fn pr_calls(&self) -> Vec<Option<String>> {
        self.pr_calls.lock().unwrap().clone()
    }

    pub(crate) fn team_calls(&self) -> Vec<Option<String>> {
        self.team_calls.lock().unwrap().clone()
    }

    fn page<T: Clone>(pages: &[Vec<T>], cursor: Option<&str>) -> Page<T> {
        let index = cursor.map_or(0, |c| c.parse::<usize>().unwrap());
        let has_next_page = index + 1 < pages.len();
        Page {
            items: pages.get(index).cloned().unwrap_or_default(),
            has_next_page,
            end_cursor: has_next_page.then(|| (index + 1).to_string()),
        }
    }
}

impl GitHubSource for FakeSource {
    async fn pull_request_page(
        &self,
        _owner: &str,
        _repo: &str,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<Page<PullRequest>, UpstreamError> {
        self.pr_calls.lock().unwrap().push(cursor.map(str::to_string));
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Self::page(&self.pr_pages, cursor))
    }

    async fn team_member_page(
        &self,
        _org: &str,
        _team_slug: &str,
        cursor: Option<&str>,
    ) -> Result<Page<String>, UpstreamError> {
        self.team_calls.lock().unwrap().push(cursor.map(str::to_string));
        if let Some(err) = &self.team_failure {
            return Err(err.clone());
        }
        Ok(Self::page(&self.team_pages, cursor))
    }
}
