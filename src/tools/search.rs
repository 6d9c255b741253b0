//! Search backends for the `web_search` tool

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const BRAVE_WEB_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Search tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Number of hits to request and render
    pub max_results: usize,
    /// Burst size of the outbound rate limiter
    pub rate_limit_burst: u64,
    /// Sustained outbound requests per second
    pub rate_limit_per_sec: f64,
    /// Brave Search API key; the stub backend is used when absent
    pub brave_api_key: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_results: 3,
            rate_limit_burst: 10,
            rate_limit_per_sec: 1.0,
            brave_api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    /// Plain-text rendering used as the tool output
    pub fn render(&self) -> String {
        if self.hits.is_empty() {
            return format!("No results found for '{}'.", self.query);
        }
        self.hits
            .iter()
            .enumerate()
            .map(|(i, hit)| format!("{}. {}\n   {}\n   {}", i + 1, hit.title, hit.url, hit.snippet))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug)]
pub enum SearchError {
    Request(String),
    InvalidResponse(String),
    RateLimited,
    Unavailable(String),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::Request(msg) => write!(f, "Search request failed: {}", msg),
            SearchError::InvalidResponse(msg) => {
                write!(f, "Failed to parse search response: {}", msg)
            }
            SearchError::RateLimited => write!(f, "Rate limited by search provider"),
            SearchError::Unavailable(msg) => write!(f, "Search unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SearchError {}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        SearchError::Request(e.to_string())
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> Result<SearchResults, SearchError>;
}

/// Offline backend returning a canned pointer to the Python docs
#[derive(Debug, Clone, Default)]
pub struct StubSearch;

#[async_trait]
impl SearchBackend for StubSearch {
    fn name(&self) -> &str {
        "stub"
    }

    async fn search(&self, query: &str) -> Result<SearchResults, SearchError> {
        Ok(SearchResults {
            query: query.to_string(),
            hits: vec![SearchHit {
                title: format!("Python documentation: {}", query),
                url: "https://docs.python.org/3/search.html".to_string(),
                snippet: format!(
                    "Offline search: look up '{}' in the official Python tutorial and library reference.",
                    query
                ),
            }],
        })
    }
}

/// Brave Search API backend
#[derive(Debug, Clone)]
pub struct BraveSearch {
    client: reqwest::Client,
    api_key: String,
    count: usize,
}

// Only the fields we render
#[derive(Debug, Deserialize)]
struct BraveApiResponse {
    #[serde(default)]
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    #[serde(default)]
    results: Vec<BraveWebResult>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

impl BraveSearch {
    pub fn new(api_key: impl Into<String>, config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            count: config.max_results.clamp(1, 20),
        })
    }
}

#[async_trait]
impl SearchBackend for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str) -> Result<SearchResults, SearchError> {
        debug!(query_len = query.len(), count = self.count, "Brave search request");
        let response = self
            .client
            .get(BRAVE_WEB_SEARCH_URL)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query)])
            .query(&[("count", self.count.to_string())])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            return Err(SearchError::Request(format!("HTTP {}: {}", status, body)));
        }

        let api_response: BraveApiResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        let hits = api_response
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .take(self.count)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.description,
            })
            .collect();

        Ok(SearchResults {
            query: query.to_string(),
            hits,
        })
    }
}
