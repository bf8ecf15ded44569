//! Application configuration and environment variable parsing.
//!
//! Settings are read from the environment (optionally seeded from a `.env`
//! file). They govern where the GitHub API lives, how pages are requested and
//! throttled, and how failed requests are retried. Every setting has a default.

use crate::fetcher::FetchSettings;
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::time::Duration;

/// GitHub's GraphQL API caps connection pages at 100 nodes.
const MAX_PAGE_SIZE: u32 = 100;

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URI of the GitHub API. GraphQL requests go to `{base}/graphql`.
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// Number of pull requests requested per page.
    #[serde(default = "default_pr_page_size")]
    pub pr_page_size: u32,

    /// Pause between consecutive page requests, in milliseconds.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Attempts per request before a transient failure is given up on.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,

    /// Read timeout for a single upstream request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Directory holding the bundled web form.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

fn default_port() -> u16 {
    3000
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_pr_page_size() -> u32 {
    50
}

fn default_page_delay_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_static_dir() -> String {
    "dist".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            github_api_url: default_github_api_url(),
            pr_page_size: default_pr_page_size(),
            page_delay_ms: default_page_delay_ms(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            static_dir: default_static_dir(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pr_page_size == 0 || self.pr_page_size > MAX_PAGE_SIZE {
            anyhow::bail!(
                "PR_PAGE_SIZE must be between 1 and {}, got {}",
                MAX_PAGE_SIZE,
                self.pr_page_size
            );
        }
        if self.max_retries == 0 {
            anyhow::bail!("MAX_RETRIES must be at least 1");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            page_size: self.pr_page_size,
            page_delay: Duration::from_millis(self.page_delay_ms),
            retry: RetryPolicy {
                max_attempts: self.max_retries,
                initial_delay: Duration::from_millis(self.initial_retry_delay_ms),
            },
        }
    }
}
