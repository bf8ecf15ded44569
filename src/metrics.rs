//! Review statistics computed from a fetched set of pull requests.

use crate::stats::{average, hours_between, median};
use crate::types::{PrState, PullRequest, ReviewState, TimeWindow};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Per-reviewer breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerMetric {
    /// Reviewer login, published as `name`.
    #[serde(rename = "name")]
    pub login: String,
    pub total_reviews: u64,
    pub approved: u64,
    pub changes_requested: u64,
    pub commented: u64,
    pub dismissed: u64,
    pub pending: u64,
    /// Distinct pull requests this reviewer reviewed at least once.
    #[serde(rename = "uniquePRs")]
    pub unique_prs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub average: f64,
    pub median: f64,
}

impl Summary {
    fn of(samples: &[f64]) -> Self {
        Self {
            average: average(samples),
            median: median(samples),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Average {
    pub average: f64,
}

/// Hours elapsed, summarised over pull requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub time_to_first_review: Summary,
    pub time_to_merge: Summary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    #[serde(rename = "reviewsPerPR")]
    pub reviews_per_pr: Summary,
    pub approvals_before_merge: Average,
}

/// Aggregate report for one repository and window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrMetrics {
    pub window: TimeWindow,
    /// Sorted by `total_reviews`, most active first.
    pub reviewers: Vec<ReviewerMetric>,
    #[serde(rename = "totalPRs")]
    pub total_prs: u64,
    #[serde(rename = "openPRs")]
    pub open_prs: u64,
    #[serde(rename = "closedPRs")]
    pub closed_prs: u64,
    #[serde(rename = "mergedPRs")]
    pub merged_prs: u64,
    pub total_reviews: u64,
    pub total_comments: u64,
    /// Whether the reviewer list was narrowed to a team.
    pub team_filter: bool,
    pub timing: Timing,
    pub distribution: Distribution,
}

/// Running totals for one reviewer while pull requests are scanned.
#[derive(Default)]
struct ReviewerTally {
    metric: ReviewerMetric,
    prs: HashSet<u64>,
}

impl ReviewerTally {
    fn record(&mut self, pr_number: u64, state: ReviewState) {
        let metric = &mut self.metric;
        metric.total_reviews += 1;
        match state {
            ReviewState::Approved => metric.approved += 1,
            ReviewState::ChangesRequested => metric.changes_requested += 1,
            ReviewState::Commented => metric.commented += 1,
            ReviewState::Dismissed => metric.dismissed += 1,
            ReviewState::Pending => metric.pending += 1,
        }
        self.prs.insert(pr_number);
    }

    fn finish(self) -> ReviewerMetric {
        ReviewerMetric {
            unique_prs: self.prs.len() as u64,
            ..self.metric
        }
    }
}

/// Computes the report for `prs`.
///
/// When `team_members` is non-empty only those logins are kept in the
/// reviewer list; repository-wide totals are unaffected.
pub fn aggregate(prs: &[PullRequest], window: TimeWindow, team_members: &[String]) -> PrMetrics {
    let mut tallies: IndexMap<String, ReviewerTally> = IndexMap::new();
    let mut state_counts: HashMap<PrState, u64> = HashMap::new();
    let mut total_reviews = 0;
    let mut total_comments = 0;

    let mut time_to_first_review = Vec::new();
    let mut time_to_merge = Vec::new();
    let mut reviews_per_pr = Vec::with_capacity(prs.len());
    let mut approvals_before_merge = Vec::new();

    for pr in prs {
        *state_counts.entry(pr.state).or_default() += 1;

        total_reviews += pr.review_count;
        total_comments += pr.comment_count;
        reviews_per_pr.push(pr.review_count as f64);

        if let Some(hours) = first_review_hours(pr) {
            time_to_first_review.push(hours);
        }

        if let Some(merged_at) = pr.merged_at {
            time_to_merge.push(hours_between(pr.created_at, merged_at));
            let approvals = pr
                .reviews
                .iter()
                .filter(|review| review.state == ReviewState::Approved)
                .count();
            approvals_before_merge.push(approvals as f64);
        }

        let pr_author = pr.author_login();
        for review in &pr.reviews {
            let Some(reviewer) = review.author.as_ref() else {
                continue;
            };
            if Some(reviewer.login.as_str()) == pr_author {
                continue;
            }
            tallies
                .entry(reviewer.login.clone())
                .or_insert_with(|| ReviewerTally {
                    metric: ReviewerMetric {
                        login: reviewer.login.clone(),
                        ..Default::default()
                    },
                    prs: HashSet::new(),
                })
                .record(pr.number, review.state);
        }
    }

    let team: HashSet<&str> = team_members.iter().map(String::as_str).collect();
    let mut reviewers: Vec<ReviewerMetric> = tallies
        .into_values()
        .filter(|tally| team.is_empty() || team.contains(tally.metric.login.as_str()))
        .map(ReviewerTally::finish)
        .collect();
    reviewers.sort_by(|a, b| b.total_reviews.cmp(&a.total_reviews));

    let count = |state: PrState| state_counts.get(&state).copied().unwrap_or(0);

    PrMetrics {
        window,
        reviewers,
        total_prs: prs.len() as u64,
        open_prs: count(PrState::Open),
        closed_prs: count(PrState::Closed),
        merged_prs: count(PrState::Merged),
        total_reviews,
        total_comments,
        team_filter: !team.is_empty(),
        timing: Timing {
            time_to_first_review: Summary::of(&time_to_first_review),
            time_to_merge: Summary::of(&time_to_merge),
        },
        distribution: Distribution {
            reviews_per_pr: Summary::of(&reviews_per_pr),
            approvals_before_merge: Average {
                average: average(&approvals_before_merge),
            },
        },
    }
}

/// Hours from the moment the PR became reviewable to its earliest submitted review.
fn first_review_hours(pr: &PullRequest) -> Option<f64> {
    let first_submitted = pr
        .reviews
        .iter()
        .filter_map(|review| review.submitted_at)
        .min()?;
    let start = pr.ready_for_review_at().unwrap_or(pr.created_at);
    Some(hours_between(start, first_submitted))
}
