use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Invalid structured output: {message}")]
    StructuredOutput { message: String },
}

impl AppError {
    /// Whether this error indicates a setup defect that must abort the run
    /// rather than being isolated to one research branch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config { .. })
    }
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Text-generation collaborator errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Stream error: {message}")]
    Stream { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Web-search collaborator errors
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Preference/memory collaborator errors
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for text-generation operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for web-search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Result type alias for preference lookups
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::StructuredOutput {
            message: "stream ended early".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid structured output: stream ended early");
    }

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(AppError::Config {
            message: "capacity".to_string()
        }
        .is_fatal());
        assert!(!AppError::StructuredOutput {
            message: "x".to_string()
        }
        .is_fatal());
        assert!(!AppError::Search(SearchError::Timeout { timeout_ms: 10 }).is_fatal());
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::RunNotFound {
            run_id: "run-123".to_string(),
        };
        assert_eq!(err.to_string(), "Run not found: run-123");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = LlmError::Stream {
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "Stream error: connection reset");

        let err = LlmError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_search_error_display() {
        let err = SearchError::Provider {
            provider: "firecrawl".to_string(),
            message: "quota exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Search provider firecrawl failed: quota exceeded"
        );

        let err = SearchError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 500 - boom");
    }

    #[test]
    fn test_memory_error_display() {
        let err = MemoryError::InvalidResponse {
            message: "not a list".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid response: not a list");
    }

    #[test]
    fn test_collaborator_error_conversion_to_app_error() {
        let app_err: AppError = LlmError::Timeout { timeout_ms: 1000 }.into();
        assert!(matches!(app_err, AppError::Llm(_)));

        let app_err: AppError = SearchError::Timeout { timeout_ms: 1000 }.into();
        assert!(matches!(app_err, AppError::Search(_)));

        let app_err: AppError = StorageError::RunNotFound {
            run_id: "r".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }
}
