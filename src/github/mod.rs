pub mod rate_limit;
pub mod transport;
pub mod types;

pub use rate_limit::RateLimit;
pub use transport::{ReqwestTransport, Transport};
pub use types::{EntityType, ItemState, RawItem, ReviewEvent, ReviewState, SearchQuery};

use chrono::Utc;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::SearchConfig;
use types::SearchPage;

/// Reviews are fetched with the largest page the API allows.
const REVIEWS_PER_PAGE: usize = 100;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub token not found: pass --token, set GITHUB_TOKEN or add it to .gh-analytics.toml")]
    MissingToken,

    #[error("GitHub rejected the credentials ({status}) for {url}: {message}")]
    Authentication {
        status: u16,
        url: String,
        message: String,
    },

    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response from {context}: {reason}")]
    MalformedResponse { context: String, reason: String },

    #[error("Still rate limited after {attempts} waits for {url}")]
    RateLimitExhausted { url: String, attempts: u32 },

    #[error("GitHub API returned {status} for {url}: {message}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        message: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Pulls the `message` field out of a GitHub error body, or the raw body.
fn api_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ApiError {
        message: String,
    }

    serde_json::from_str::<ApiError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Search-API client. Owns the transport and the rate-limit bookkeeping, so
/// every call through it honours the same quota and reset clock.
pub struct SearchClient {
    transport: Box<dyn Transport>,
    api_url: String,
    settings: SearchConfig,
    rate_limit: RateLimit,
}

impl SearchClient {
    pub fn new(transport: Box<dyn Transport>, api_url: &str, settings: SearchConfig) -> Self {
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
            settings,
            rate_limit: RateLimit::default(),
        }
    }

    pub fn rate_limit(&self) -> &RateLimit {
        &self.rate_limit
    }

    /// Start paging through a query. Nothing is requested until the first
    /// `next_page` call, and each call to `search` re-issues the query.
    pub fn search(&mut self, query: &SearchQuery) -> SearchPager<'_> {
        let max_results = self.settings.result_cap();
        SearchPager {
            client: self,
            q: query.to_query_string(),
            page: 1,
            fetched: 0,
            limit: max_results,
            done: false,
        }
    }

    /// Every hit of a query in API order, duplicates across pages removed.
    #[instrument(skip(self), fields(q = %query.to_query_string()))]
    pub async fn search_all(&mut self, query: &SearchQuery) -> Result<Vec<RawItem>, GitHubError> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut pager = self.search(query);

        while let Some(page) = pager.next_page().await? {
            for item in page {
                if seen.insert((item.repository.clone(), item.number)) {
                    items.push(item);
                } else {
                    debug!(repo = %item.repository, number = item.number, "dropping duplicate search hit");
                }
            }
        }

        info!(count = items.len(), "search complete");
        Ok(items)
    }

    /// Reviews of a pull request, oldest first. Pending reviews without a
    /// submission time sort last.
    #[instrument(skip(self, item), fields(repo = %item.repository, pr = item.number))]
    pub async fn reviews(&mut self, item: &RawItem) -> Result<Vec<ReviewEvent>, GitHubError> {
        let pr_url = item.pull_request_url.as_deref().ok_or_else(|| GitHubError::MalformedResponse {
            context: format!("search hit {}#{}", item.repository, item.number),
            reason: "merged pull request has no pull_request url".to_string(),
        })?;
        let url = format!("{}/reviews", pr_url.trim_end_matches('/'));

        let mut reviews = Vec::new();
        let mut page = 1u32;
        loop {
            let query = vec![
                ("per_page".to_string(), REVIEWS_PER_PAGE.to_string()),
                ("page".to_string(), page.to_string()),
            ];
            let batch: Vec<ReviewEvent> = self.get_json(&url, &query).await?;
            let len = batch.len();
            reviews.extend(batch);
            if len < REVIEWS_PER_PAGE {
                break;
            }
            page += 1;
        }

        reviews.sort_by_key(|r| (r.submitted_at.is_none(), r.submitted_at));
        debug!(reviews = reviews.len(), "fetched reviews");
        Ok(reviews)
    }

    /// GET + decode, waiting out rate limits and retrying the same request.
    async fn get_json<D: DeserializeOwned>(
        &mut self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<D, GitHubError> {
        let mut waits = 0u32;
        loop {
            if let Some(wait) = self.rate_limit.wait_before_request(Utc::now()) {
                warn!(wait_secs = wait.as_secs(), reset_at = ?self.rate_limit.reset_at(), "rate limit quota spent, waiting for reset");
                tokio::time::sleep(wait).await;
            }

            let response = self.transport.get(url, query).await?;
            self.rate_limit.observe(&response);

            if RateLimit::is_limited(&response) {
                if waits >= self.settings.max_rate_limit_retries {
                    return Err(GitHubError::RateLimitExhausted {
                        url: url.to_string(),
                        attempts: waits,
                    });
                }
                let wait = self.rate_limit.backoff(&response, Utc::now());
                waits += 1;
                warn!(status = response.status, wait_secs = wait.as_secs(), attempt = waits, %url, "rate limited, retrying after wait");
                tokio::time::sleep(wait).await;
                continue;
            }

            return match response.status {
                _ if response.is_success() => {
                    serde_json::from_str(&response.body).map_err(|e| GitHubError::MalformedResponse {
                        context: url.to_string(),
                        reason: e.to_string(),
                    })
                }
                401 | 403 => Err(GitHubError::Authentication {
                    status: response.status,
                    url: url.to_string(),
                    message: api_message(&response.body),
                }),
                status => Err(GitHubError::UnexpectedStatus {
                    status,
                    url: url.to_string(),
                    message: api_message(&response.body),
                }),
            };
        }
    }
}

/// Lazy walk over the pages of one search.
pub struct SearchPager<'a> {
    client: &'a mut SearchClient,
    q: String,
    page: u32,
    fetched: usize,
    limit: usize,
    done: bool,
}

impl SearchPager<'_> {
    /// The next page of hits, or `None` once the result set is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawItem>>, GitHubError> {
        if self.done {
            return Ok(None);
        }

        let per_page = self.client.settings.page_size();
        let url = format!("{}/search/issues", self.client.api_url);
        let query = vec![
            ("q".to_string(), self.q.clone()),
            ("per_page".to_string(), per_page.to_string()),
            ("page".to_string(), self.page.to_string()),
        ];
        let page: SearchPage = self.client.get_json(&url, &query).await.map_err(|e| match e {
            GitHubError::MalformedResponse { reason, .. } => GitHubError::MalformedResponse {
                context: format!("search page {} of {:?}", self.page, self.q),
                reason,
            },
            other => other,
        })?;

        if self.page == 1 {
            info!(total = page.total_count, "search matched");
            if page.total_count as usize > self.limit {
                warn!(
                    total = page.total_count,
                    limit = self.limit,
                    "search matches more items than the API will return, narrow the date range"
                );
            }
            self.limit = self.limit.min(page.total_count as usize);
        }
        if page.incomplete_results {
            warn!(page = self.page, "search API reported incomplete results");
        }

        let received = page.items.len();
        let items = page
            .items
            .into_iter()
            .map(RawItem::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| GitHubError::MalformedResponse {
                context: format!("search page {} of {:?}", self.page, self.q),
                reason,
            })?;

        self.fetched += received;
        info!(page = self.page, received, fetched = self.fetched, "fetched page");
        if received == 0 {
            self.done = true;
            return Ok(None);
        }
        if received < per_page as usize || self.fetched >= self.limit {
            self.done = true;
        }
        self.page += 1;
        Ok(Some(items))
    }
}
