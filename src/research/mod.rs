//! Recursive research engine.
//!
//! - [`DeepResearch`] walks the query tree and reports [`ResearchStep`]s.
//! - [`ConcurrencyLimiter`] bounds concurrent branches across the tree.
//! - [`ProgressSink`] and its implementations consume progress events.
//! - [`write_final_report`] and [`generate_feedback`] are the calls made
//!   before and after a run.

mod feedback;
mod generator;
mod limiter;
mod orchestrator;
mod processor;
mod progress;
mod report;
pub mod schema;
mod types;

pub use feedback::{collect_feedback, generate_feedback, FeedbackChunk, PartialFeedback};
pub use generator::{generate_search_queries, parse_search_queries};
pub use limiter::{CapacityBoost, ConcurrencyLimiter, LimiterPermit};
pub use orchestrator::{DeepResearch, ResearchParams};
pub use processor::{parse_search_result, process_search_result};
pub use progress::{ChannelSink, FanoutSink, ProgressSink, TracingSink};
pub use report::{collect_report, write_final_report, ReportRequest};
pub use types::{
    child_node_id, next_breadth, PartialProcessedSearchResult, PartialSearchQueries,
    PartialSearchQuery, ProcessedSearchResult, ResearchResult, ResearchStep, SearchQuery,
    ROOT_NODE_ID,
};
