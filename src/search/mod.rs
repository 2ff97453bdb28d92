//! Web-search collaborators and the search executor.
//!
//! [`WebSearch`] is the provider seam; [`TavilyClient`] and
//! [`FirecrawlClient`] are the HTTP implementations. [`SearchExecutor`] wraps
//! whichever provider is configured and normalizes what it returns.

mod firecrawl;
mod tavily;

pub use firecrawl::FirecrawlClient;
pub use tavily::TavilyClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::{RequestConfig, SearchConfig, SearchProvider};
use crate::error::SearchResult;

/// One normalized search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchResult {
    /// Page text (markdown or extracted content).
    pub content: String,
    /// Page URL.
    pub url: String,
    /// Page title, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Per-call search options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Upper bound on returned results.
    pub max_results: usize,
    /// Language code hint; not every provider honours it.
    pub language_hint: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 5,
            language_hint: None,
        }
    }
}

/// A web-search backend.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Provider name, for logs and error messages.
    fn name(&self) -> &'static str;

    /// Run one query. Failures are returned as-is; no retries.
    async fn search(&self, query: &str, options: &SearchOptions)
        -> SearchResult<Vec<WebSearchResult>>;
}

/// Build the configured search provider.
pub fn from_config(
    config: &SearchConfig,
    request_config: RequestConfig,
) -> SearchResult<Arc<dyn WebSearch>> {
    Ok(match config.provider {
        SearchProvider::Tavily => Arc::new(TavilyClient::new(config, request_config)?),
        SearchProvider::Firecrawl => Arc::new(FirecrawlClient::new(config, request_config)?),
    })
}

/// Normalizing front for a [`WebSearch`] provider.
#[derive(Clone)]
pub struct SearchExecutor {
    provider: Arc<dyn WebSearch>,
}

impl SearchExecutor {
    /// Wrap a provider.
    pub fn new(provider: Arc<dyn WebSearch>) -> Self {
        Self { provider }
    }

    /// Search and keep only results that carry both content and a URL,
    /// with surrounding whitespace trimmed from the content.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> SearchResult<Vec<WebSearchResult>> {
        let start = Instant::now();
        let raw = match self.provider.search(query, options).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(
                    provider = self.provider.name(),
                    query = %query,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Web search failed"
                );
                return Err(e);
            }
        };

        let received = raw.len();
        let results: Vec<WebSearchResult> = raw
            .into_iter()
            .filter_map(|r| {
                let content = r.content.trim();
                let url = r.url.trim();
                if content.is_empty() || url.is_empty() {
                    return None;
                }
                Some(WebSearchResult {
                    content: content.to_string(),
                    url: url.to_string(),
                    title: r.title.filter(|t| !t.trim().is_empty()),
                })
            })
            .collect();

        info!(
            provider = self.provider.name(),
            query = %query,
            received,
            kept = results.len(),
            latency_ms = start.elapsed().as_millis(),
            "Web search complete"
        );
        Ok(results)
    }
}
