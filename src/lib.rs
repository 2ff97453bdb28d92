//! # Deep Research
//!
//! A recursive research engine: given a query it streams sub-queries from a
//! text-generation model, searches the web for each, extracts learnings and
//! follow-up questions from the results and recurses into the follow-ups
//! until a breadth/depth budget is spent.
//!
//! ## Architecture
//!
//! ```text
//! DeepResearch ──► query generator ──► TextGenerator (streaming LLM)
//!      │                                     │
//!      │                           structured stream parser
//!      ▼
//! ConcurrencyLimiter ──► SearchExecutor ──► WebSearch (Tavily / Firecrawl)
//!      │
//!      ▼
//! result processor ──► recurse into follow-ups ──► ProgressSink
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use deep_research::{config::Config, llm::OpenAiClient, search};
//! use deep_research::research::{DeepResearch, ResearchParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let llm = Arc::new(OpenAiClient::new(config.require_llm()?, config.request.clone())?);
//!     let provider = search::from_config(config.require_search()?, config.request.clone())?;
//!     let engine = DeepResearch::new(llm, provider).with_settings(config.research.clone());
//!     let result = engine
//!         .run(ResearchParams::from_settings("grid-scale storage", &config.research))
//!         .await?;
//!     println!("{} learnings", result.learnings.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Streaming text-generation client and types.
pub mod llm;
/// User-preference store.
pub mod memory;
/// Prompt templates for every generation call.
pub mod prompts;
/// Recursive research engine, limiter and progress sinks.
pub mod research;
/// Web-search providers and the search executor.
pub mod search;
/// SQLite run journal.
pub mod storage;
/// Incremental structured-output parsing.
pub mod streaming;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use research::{DeepResearch, ResearchParams, ResearchResult, ResearchStep};
