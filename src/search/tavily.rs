use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{SearchOptions, WebSearch, WebSearchResult};
use crate::config::{RequestConfig, SearchConfig};
use crate::error::{SearchError, SearchResult};

/// Tavily search API client
#[derive(Clone)]
pub struct TavilyClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl TavilyClient {
    /// Create a new client
    pub fn new(config: &SearchConfig, request_config: RequestConfig) -> SearchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(SearchError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> SearchResult<Vec<WebSearchResult>> {
        let url = format!("{}/search", self.base_url);
        let body = TavilyRequest {
            query,
            max_results: options.max_results,
        };
        debug!(query = %query, max_results = options.max_results, "Calling Tavily");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    SearchError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TavilyResponse =
            response
                .json()
                .await
                .map_err(|e| SearchError::InvalidResponse {
                    message: format!("Failed to parse Tavily response: {}", e),
                })?;

        Ok(parsed
            .results
            .into_iter()
            .map(|hit| WebSearchResult {
                content: hit.content.unwrap_or_default(),
                url: hit.url.unwrap_or_default(),
                title: hit.title,
            })
            .collect())
    }
}
