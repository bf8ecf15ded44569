pub mod config;
pub mod error;
pub mod fetcher;
pub mod github;
pub mod metrics;
pub mod querier;
pub mod retry;
pub mod stats;
pub mod team;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use config::AppConfig;
use error::PipelineError;
use metrics::PrMetrics;
use querier::MetricsQuerier;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use types::{Credential, MetricsRequest, TimeWindow, WindowError};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Shared application state accessible to all request handlers.
pub struct AppState {
    /// Runs the metrics pipeline.
    pub querier: MetricsQuerier,
    /// Application configuration loaded from environment variables.
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let querier = MetricsQuerier::new(&config);
        Self { querier, config }
    }
}

/// Fields submitted by the web form.
///
/// The window is either the trailing `days` or an explicit `start_date`..=`end_date`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsForm {
    pub org: String,
    pub repo: String,
    pub token: Credential,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub days: Option<u32>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl MetricsForm {
    pub fn into_request(self, now: DateTime<Utc>) -> Result<MetricsRequest, WindowError> {
        let window = match (self.days, self.start_date, self.end_date) {
            (Some(days), _, _) => TimeWindow::from_days(days, now)?,
            (None, Some(start), Some(end)) => TimeWindow::from_dates(start, end)?,
            _ => return Err(WindowError::Missing),
        };

        let team = self
            .team
            .map(|team| team.trim().to_string())
            .filter(|team| !team.is_empty());

        Ok(MetricsRequest {
            org: self.org.trim().to_string(),
            repo: self.repo.trim().to_string(),
            credential: self.token,
            window,
            team,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricsResponse {
    Ok { metrics: PrMetrics },
    Empty { message: String },
}

pub fn create_app(state: Arc<AppState>) -> Router {
    let static_dir = &state.config.static_dir;
    let serve_dir = ServeDir::new(static_dir)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/metrics", post(get_metrics))
        .fallback_service(serve_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "review-metrics",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Json(form): Json<MetricsForm>,
) -> Result<Json<MetricsResponse>, (StatusCode, String)> {
    let request = form
        .into_request(Utc::now())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    // Dropping this handler (client went away) cancels the pipeline.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.querier.query(&request, &cancel).await {
        Ok(metrics) => {
            tracing::debug!(repo = %request, "Returning metrics");
            Ok(Json(MetricsResponse::Ok { metrics }))
        }
        Err(e) if e.is_empty_result() => Ok(Json(MetricsResponse::Empty {
            message: e.to_string(),
        })),
        Err(e) => {
            if e.is_cancelled() {
                tracing::debug!(repo = %request, "Metrics request cancelled");
            } else {
                tracing::error!("Failed to compute metrics for {}: {}", request, e);
            }
            Err((status_for(&e), e.to_string()))
        }
    }
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidCredential => StatusCode::UNAUTHORIZED,
        PipelineError::RepositoryNotFound => StatusCode::NOT_FOUND,
        PipelineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::InvalidWindow(_) => StatusCode::BAD_REQUEST,
        PipelineError::Upstream(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        // Answered with a 200 `empty` body by `get_metrics`.
        PipelineError::NoPullRequests => StatusCode::OK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn form(json: serde_json::Value) -> MetricsForm {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_form_with_days() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let request = form(serde_json::json!({
            "org": " acme ", "repo": "widgets ", "token": "t", "days": 30, "team": "  "
        }))
        .into_request(now)
        .unwrap();

        assert_eq!(request.org, "acme");
        assert_eq!(request.repo, "widgets");
        assert_eq!(request.team, None);
        assert_eq!(request.window.since, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_form_with_dates() {
        let request = form(serde_json::json!({
            "org": "acme", "repo": "widgets", "token": "t",
            "startDate": "2024-01-01", "endDate": "2024-01-15", "team": "core"
        }))
        .into_request(Utc::now())
        .unwrap();

        assert_eq!(request.team.as_deref(), Some("core"));
        assert!(request.window.contains(Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap()));
    }

    #[test]
    fn test_form_without_window() {
        let result = form(serde_json::json!({
            "org": "acme", "repo": "widgets", "token": "t", "startDate": "2024-01-01"
        }))
        .into_request(Utc::now());

        assert_eq!(result.unwrap_err(), WindowError::Missing);
    }

    #[test]
    fn test_form_with_huge_days_is_rejected() {
        let result = form(serde_json::json!({
            "org": "acme", "repo": "widgets", "token": "t", "days": u32::MAX
        }))
        .into_request(Utc::now());

        assert_eq!(result.unwrap_err(), WindowError::OutOfRange);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&PipelineError::InvalidCredential), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&PipelineError::RepositoryNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&PipelineError::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&PipelineError::Upstream("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&PipelineError::Cancelled), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&PipelineError::Client("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
