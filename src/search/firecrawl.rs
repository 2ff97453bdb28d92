use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{SearchOptions, WebSearch, WebSearchResult};
use crate::config::{RequestConfig, SearchConfig};
use crate::error::{SearchError, SearchResult};

/// Firecrawl search API client. Results carry the scraped page as markdown.
#[derive(Clone)]
pub struct FirecrawlClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FirecrawlRequest<'a> {
    query: &'a str,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    lang: Option<&'a str>,
    scrape_options: ScrapeOptions,
}

#[derive(Debug, Serialize)]
struct ScrapeOptions {
    formats: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    data: Vec<FirecrawlDocument>,
    #[serde(default)]
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct FirecrawlDocument {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
}

impl FirecrawlClient {
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

    fn provider_error(message: String) -> SearchError {
        SearchError::Provider {
            provider: "firecrawl".to_string(),
            message,
        }
    }
}

#[async_trait]
impl WebSearch for FirecrawlClient {
    fn name(&self) -> &'static str {
        "firecrawl"
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> SearchResult<Vec<WebSearchResult>> {
        let url = format!("{}/v1/search", self.base_url);
        let body = FirecrawlRequest {
            query,
            limit: options.max_results,
            lang: options.language_hint.as_deref(),
            scrape_options: ScrapeOptions {
                formats: vec!["markdown"],
            },
        };
        debug!(
            query = %query,
            limit = options.max_results,
            lang = ?options.language_hint,
            "Calling Firecrawl"
        );

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

        let parsed: FirecrawlResponse =
            response
                .json()
                .await
                .map_err(|e| SearchError::InvalidResponse {
                    message: format!("Failed to parse Firecrawl response: {}", e),
                })?;

        if let Some(error) = parsed.error {
            return Err(Self::provider_error(error));
        }
        if !parsed.success {
            return Err(Self::provider_error("search was not successful".to_string()));
        }

        Ok(parsed
            .data
            .into_iter()
            .map(|doc| WebSearchResult {
                content: doc.markdown.unwrap_or_default(),
                url: doc.url.unwrap_or_default(),
                title: doc.title,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let body = FirecrawlRequest {
            query: "q",
            limit: 5,
            lang: Some("de"),
            scrape_options: ScrapeOptions {
                formats: vec!["markdown"],
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "query": "q",
                "limit": 5,
                "lang": "de",
                "scrapeOptions": {"formats": ["markdown"]}
            })
        );
    }

    #[test]
    fn test_request_omits_missing_lang() {
        let body = FirecrawlRequest {
            query: "q",
            limit: 1,
            lang: None,
            scrape_options: ScrapeOptions { formats: vec![] },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("lang").is_none());
    }
}
