//! User-preference (long-term memory) collaborator.
//!
//! Preferences are optional context: [`NoopPreferences`] stands in when no
//! store is configured, and callers treat lookup failures as "no
//! preferences" via [`preferences_or_empty`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{MemoryConfig, RequestConfig};
use crate::error::{MemoryError, MemoryResult};

/// Source of user preference strings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// All stored preferences for the configured user.
    async fn list_preferences(&self) -> MemoryResult<Vec<String>>;
}

/// Store used when none is configured. Always empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreferences;

#[async_trait]
impl PreferenceStore for NoopPreferences {
    async fn list_preferences(&self) -> MemoryResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Fetch preferences, logging and swallowing any failure.
pub async fn preferences_or_empty(store: &dyn PreferenceStore) -> Vec<String> {
    match store.list_preferences().await {
        Ok(preferences) => preferences,
        Err(e) => {
            warn!(error = %e, "Preference lookup failed, continuing without preferences");
            Vec::new()
        }
    }
}

/// Build the configured store: Mem0 when an API key is set, otherwise no-op.
pub fn from_config(
    config: &MemoryConfig,
    request_config: RequestConfig,
) -> MemoryResult<Arc<dyn PreferenceStore>> {
    match config.api_key.as_deref() {
        Some(key) if !key.is_empty() => Ok(Arc::new(Mem0Client::new(config, request_config)?)),
        _ => {
            info!("No MEM0_API_KEY set, user preferences disabled");
            Ok(Arc::new(NoopPreferences))
        }
    }
}

/// Mem0 memories API client
#[derive(Clone)]
pub struct Mem0Client {
    client: Client,
    base_url: String,
    api_key: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct MemoryEntry {
    #[serde(default)]
    memory: Option<String>,
}

/// The list endpoint answers with a bare array or, when paginated, with
/// `{"results": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MemoryListResponse {
    Plain(Vec<MemoryEntry>),
    Paged { results: Vec<MemoryEntry> },
}

impl Mem0Client {
    /// Create a new client
    pub fn new(config: &MemoryConfig, request_config: RequestConfig) -> MemoryResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(MemoryError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            user_id: config.user_id.clone(),
        })
    }

    /// User whose memories are read
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[async_trait]
impl PreferenceStore for Mem0Client {
    async fn list_preferences(&self) -> MemoryResult<Vec<String>> {
        let start = Instant::now();
        let url = format!("{}/v1/memories/", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("user_id", self.user_id.as_str())])
            .header("Authorization", format!("Token {}", self.api_key))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MemoryError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MemoryListResponse =
            response
                .json()
                .await
                .map_err(|e| MemoryError::InvalidResponse {
                    message: format!("Failed to parse memories: {}", e),
                })?;
        let entries = match parsed {
            MemoryListResponse::Plain(entries) => entries,
            MemoryListResponse::Paged { results } => results,
        };

        let preferences: Vec<String> = entries
            .into_iter()
            .filter_map(|entry| entry.memory)
            .filter(|memory| !memory.trim().is_empty())
            .collect();

        debug!(
            user_id = %self.user_id,
            count = preferences.len(),
            latency_ms = start.elapsed().as_millis(),
            "Fetched user preferences"
        );
        Ok(preferences)
    }
}
