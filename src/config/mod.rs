use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
///
/// The LLM and search sections are only present when their API keys are
/// set; commands that need them ask through [`Config::require_llm`] and
/// [`Config::require_search`].
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: Option<LlmConfig>,
    pub search: Option<SearchConfig>,
    pub memory: MemoryConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub research: ResearchSettings,
}

/// OpenAI-compatible text-generation endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f64>,
}

/// Web-search provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProvider {
    Tavily,
    Firecrawl,
}

impl SearchProvider {
    /// Default API base URL for the provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            SearchProvider::Tavily => "https://api.tavily.com",
            SearchProvider::Firecrawl => "https://api.firecrawl.dev",
        }
    }

    /// Get the provider name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchProvider::Tavily => "tavily",
            SearchProvider::Firecrawl => "firecrawl",
        }
    }
}

impl std::fmt::Display for SearchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SearchProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tavily" => Ok(SearchProvider::Tavily),
            "firecrawl" => Ok(SearchProvider::Firecrawl),
            _ => Err(format!("Unknown search provider: {}", s)),
        }
    }
}

/// Web-search API configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub provider: SearchProvider,
    pub api_key: String,
    pub base_url: String,
}

/// Preference store (Mem0) configuration. No API key means no store.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub user_id: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
}

/// Default knobs for a research run
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchSettings {
    pub breadth: usize,
    pub depth: usize,
    pub language: String,
    pub search_language: Option<String>,
    pub concurrency: usize,
    pub max_search_results: usize,
    pub num_learnings: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig::from_env();
        let search = SearchConfig::from_env()?;

        let memory = MemoryConfig {
            api_key: env::var("MEM0_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            base_url: env::var("MEM0_BASE_URL")
                .unwrap_or_else(|_| "https://api.mem0.ai".to_string()),
            user_id: env::var("MEM0_USER_ID").unwrap_or_else(|_| "resume".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/research.db".to_string()),
            ),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 60000),
        };

        let defaults = ResearchSettings::default();
        let research = ResearchSettings {
            breadth: env_parse("RESEARCH_BREADTH", defaults.breadth),
            depth: env_parse("RESEARCH_DEPTH", defaults.depth),
            language: env::var("RESEARCH_LANGUAGE").unwrap_or(defaults.language),
            search_language: env::var("RESEARCH_SEARCH_LANGUAGE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            concurrency: env_parse("RESEARCH_CONCURRENCY", defaults.concurrency),
            max_search_results: env_parse(
                "RESEARCH_MAX_SEARCH_RESULTS",
                defaults.max_search_results,
            ),
            num_learnings: env_parse("RESEARCH_NUM_LEARNINGS", defaults.num_learnings),
        };
        research.validate()?;

        Ok(Config {
            llm,
            search,
            memory,
            database,
            logging,
            request,
            research,
        })
    }

    /// The LLM section, or a configuration error naming the missing key.
    pub fn require_llm(&self) -> Result<&LlmConfig, AppError> {
        self.llm.as_ref().ok_or_else(|| AppError::Config {
            message: "LLM_API_KEY is required".to_string(),
        })
    }

    /// The search section, or a configuration error naming the missing key.
    pub fn require_search(&self) -> Result<&SearchConfig, AppError> {
        self.search.as_ref().ok_or_else(|| AppError::Config {
            message: "SEARCH_API_KEY is required".to_string(),
        })
    }
}

impl LlmConfig {
    /// Read the LLM section. `None` when `LLM_API_KEY` is unset.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        Some(Self {
            api_key,
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            temperature: env::var("LLM_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok()),
        })
    }
}

impl SearchConfig {
    /// Read the search section. `None` when `SEARCH_API_KEY` is unset; an
    /// unknown `SEARCH_PROVIDER` is an error either way.
    pub fn from_env() -> Result<Option<Self>, AppError> {
        let provider = match env::var("SEARCH_PROVIDER") {
            Ok(name) => name
                .parse::<SearchProvider>()
                .map_err(|message| AppError::Config { message })?,
            Err(_) => SearchProvider::Tavily,
        };
        let Some(api_key) = env::var("SEARCH_API_KEY").ok().filter(|k| !k.trim().is_empty())
        else {
            return Ok(None);
        };
        Ok(Some(Self {
            provider,
            api_key,
            base_url: env::var("SEARCH_BASE_URL")
                .unwrap_or_else(|_| provider.default_base_url().to_string()),
        }))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ResearchSettings {
    /// Reject settings that would make the research tree or the limiter
    /// meaningless.
    pub fn validate(&self) -> Result<(), AppError> {
        let checks = [
            ("breadth", self.breadth),
            ("depth", self.depth),
            ("concurrency", self.concurrency),
            ("max_search_results", self.max_search_results),
            ("num_learnings", self.num_learnings),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(AppError::Config {
                    message: format!("research {} must be at least 1", name),
                });
            }
        }
        Ok(())
    }
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            breadth: 2,
            depth: 2,
            language: "English".to_string(),
            search_language: None,
            concurrency: 2,
            max_search_results: 5,
            num_learnings: 3,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 60000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_provider_from_str() {
        assert_eq!("tavily".parse::<SearchProvider>(), Ok(SearchProvider::Tavily));
        assert_eq!(
            "FireCrawl".parse::<SearchProvider>(),
            Ok(SearchProvider::Firecrawl)
        );
        assert!("bing".parse::<SearchProvider>().is_err());
    }

    #[test]
    fn test_search_provider_default_urls() {
        assert_eq!(
            SearchProvider::Tavily.default_base_url(),
            "https://api.tavily.com"
        );
        assert_eq!(SearchProvider::Firecrawl.to_string(), "firecrawl");
    }

    #[test]
    fn test_research_settings_default_is_valid() {
        assert!(ResearchSettings::default().validate().is_ok());
    }

    #[test]
    fn test_research_settings_rejects_zero_concurrency() {
        let settings = ResearchSettings {
            concurrency: 0,
            ..ResearchSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_research_settings_rejects_zero_breadth() {
        let settings = ResearchSettings {
            breadth: 0,
            ..ResearchSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
