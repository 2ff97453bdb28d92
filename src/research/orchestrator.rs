//! Recursive research tree walk.
//!
//! Each node generates sub-queries, then fans out one branch per query. A
//! branch holds a limiter slot for its whole lifetime: search, process and,
//! when budget remains, recurse into its follow-up questions. Before
//! recursing it boosts the shared limiter by one so the subtree is not
//! starved by the slot its parent already occupies.
//!
//! Failures are contained at the narrowest scope that can absorb them: a
//! failed generation or processing stream ends that stream early, a failed
//! branch contributes nothing, a failed node returns an empty result. Only
//! configuration errors escape.

use futures::future::{join_all, BoxFuture};
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::generator::{generate_search_queries, parse_search_queries};
use super::limiter::ConcurrencyLimiter;
use super::processor::{parse_search_result, process_search_result};
use super::progress::{ProgressSink, TracingSink};
use super::types::{
    child_node_id, next_breadth, PartialProcessedSearchResult, PartialSearchQuery,
    ProcessedSearchResult, ResearchResult, ResearchStep, SearchQuery, ROOT_NODE_ID,
};
use crate::config::ResearchSettings;
use crate::error::{AppError, AppResult};
use crate::llm::TextGenerator;
use crate::memory::{preferences_or_empty, NoopPreferences, PreferenceStore};
use crate::prompts::{next_research_query, system_prompt, QueryPrompt, ResultPrompt};
use crate::search::{SearchExecutor, SearchOptions, WebSearch, WebSearchResult};
use crate::streaming::ParseChunk;

const INVALID_STRUCTURED_OUTPUT: &str =
    "Invalid structured output: the model did not return the requested JSON structure";

/// Caller-supplied parameters of one research run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchParams {
    /// The user's research query.
    pub query: String,
    /// Sub-queries generated at the root; halved at each level.
    pub breadth: usize,
    /// Recursion cutoff. The root is depth 1.
    pub max_depth: usize,
    /// Language of learnings and follow-up questions.
    pub language: String,
    /// Language for generated search queries, if different.
    pub search_language: Option<String>,
}

impl ResearchParams {
    /// Parameters for `query` with the breadth, depth and languages of
    /// `settings`.
    pub fn from_settings(query: impl Into<String>, settings: &ResearchSettings) -> Self {
        Self {
            query: query.into(),
            breadth: settings.breadth,
            max_depth: settings.depth,
            language: settings.language.clone(),
            search_language: settings.search_language.clone(),
        }
    }

    fn validate(&self) -> AppResult<()> {
        if self.breadth == 0 {
            return Err(AppError::Config {
                message: "research breadth must be at least 1".to_string(),
            });
        }
        if self.max_depth == 0 {
            return Err(AppError::Config {
                message: "research depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Research engine. Holds the collaborators; each [`run`](Self::run) walks
/// a fresh tree.
#[derive(Clone)]
pub struct DeepResearch {
    llm: Arc<dyn TextGenerator>,
    search: SearchExecutor,
    preferences: Arc<dyn PreferenceStore>,
    sink: Arc<dyn ProgressSink>,
    limiter: Option<Arc<ConcurrencyLimiter>>,
    settings: ResearchSettings,
}

impl DeepResearch {
    /// Engine with no preferences, a tracing sink and default settings.
    pub fn new(llm: Arc<dyn TextGenerator>, search: Arc<dyn WebSearch>) -> Self {
        Self {
            llm,
            search: SearchExecutor::new(search),
            preferences: Arc::new(NoopPreferences),
            sink: Arc::new(TracingSink),
            limiter: None,
            settings: ResearchSettings::default(),
        }
    }

    /// Use `preferences` as the preference store.
    pub fn with_preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = preferences;
        self
    }

    /// Report progress to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share `limiter` across runs instead of creating one per run from
    /// the configured concurrency.
    pub fn with_limiter(mut self, limiter: Arc<ConcurrencyLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Replace the run settings (concurrency, result and learning counts).
    pub fn with_settings(mut self, settings: ResearchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run settings in effect.
    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    /// Walk the research tree for `params.query`.
    ///
    /// Branch and node failures are reported as `error` steps and leave
    /// their contribution out of the result. Configuration errors (invalid
    /// parameters, a limiter driven below one slot) are returned.
    pub async fn run(&self, params: ResearchParams) -> AppResult<ResearchResult> {
        params.validate()?;
        let limiter = match &self.limiter {
            Some(limiter) => Arc::clone(limiter),
            None => Arc::new(ConcurrencyLimiter::new(self.settings.concurrency)?),
        };

        let start = Instant::now();
        info!(
            query = %params.query,
            breadth = params.breadth,
            max_depth = params.max_depth,
            concurrency = limiter.capacity(),
            "Starting research run"
        );

        let run = RunContext {
            llm: Arc::clone(&self.llm),
            search: self.search.clone(),
            preferences: Arc::clone(&self.preferences),
            sink: Arc::clone(&self.sink),
            limiter,
            system_prompt: system_prompt(),
            language: params.language,
            search_language: params.search_language,
            max_depth: params.max_depth,
            max_search_results: self.settings.max_search_results,
            num_learnings: self.settings.num_learnings,
        };

        let result = run
            .research_node(NodeInput {
                node_id: ROOT_NODE_ID.to_string(),
                query: params.query,
                breadth: params.breadth,
                depth: 1,
                learnings: Vec::new(),
                visited_urls: Vec::new(),
            })
            .await?;

        info!(
            learnings = result.learnings.len(),
            visited_urls = result.visited_urls.len(),
            latency_ms = start.elapsed().as_millis(),
            "Research run complete"
        );
        Ok(result)
    }
}

struct NodeInput {
    node_id: String,
    query: String,
    breadth: usize,
    depth: usize,
    learnings: Vec<String>,
    visited_urls: Vec<String>,
}

/// Everything shared by the nodes of one run.
struct RunContext {
    llm: Arc<dyn TextGenerator>,
    search: SearchExecutor,
    preferences: Arc<dyn PreferenceStore>,
    sink: Arc<dyn ProgressSink>,
    limiter: Arc<ConcurrencyLimiter>,
    system_prompt: String,
    language: String,
    search_language: Option<String>,
    max_depth: usize,
    max_search_results: usize,
    num_learnings: usize,
}

impl RunContext {
    fn emit(&self, step: ResearchStep) {
        self.sink.on_progress(&step);
    }

    fn emit_error(&self, node_id: &str, message: impl Into<String>) {
        self.emit(ResearchStep::Error {
            node_id: node_id.to_string(),
            message: message.into(),
        });
    }

    /// One node of the tree. Boxed because nodes recurse through branches.
    fn research_node(&self, node: NodeInput) -> BoxFuture<'_, AppResult<ResearchResult>> {
        async move {
            let node_id = node.node_id.clone();
            let result = match self.explore(node).await {
                Ok(result) => result,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(node_id = %node_id, error = %e, "Research node failed");
                    self.emit_error(&node_id, e.to_string());
                    ResearchResult::default()
                }
            };

            if node_id == ROOT_NODE_ID {
                self.emit(ResearchStep::Complete {
                    learnings: result.learnings.clone(),
                    visited_urls: result.visited_urls.clone(),
                });
            }
            Ok(result)
        }
        .boxed()
    }

    async fn explore(&self, node: NodeInput) -> AppResult<ResearchResult> {
        let memories = preferences_or_empty(self.preferences.as_ref()).await;
        let queries = self.generate_queries(&node, &memories).await;

        let breadth = next_breadth(node.breadth);
        let branches = queries
            .into_iter()
            .enumerate()
            .map(|(index, query)| self.run_branch(&node, index, query, &memories, breadth));
        let results = join_all(branches)
            .await
            .into_iter()
            .collect::<AppResult<Vec<_>>>()?;

        Ok(ResearchResult::union(results))
    }

    /// Stream sub-queries for `node`, reporting candidates as they appear.
    async fn generate_queries(&self, node: &NodeInput, memories: &[String]) -> Vec<SearchQuery> {
        let node_id = node.node_id.as_str();
        self.emit(ResearchStep::GeneratingQuery {
            node_id: node_id.to_string(),
            parent_node_id: None,
            result: PartialSearchQuery::default(),
        });

        let slots = QueryPrompt {
            query: &node.query,
            num_queries: node.breadth,
            learnings: &node.learnings,
            memories,
            language: &self.language,
            search_language: self.search_language.as_deref(),
        };
        let stream = generate_search_queries(self.llm.as_ref(), &self.system_prompt, &slots).await;
        let mut chunks = parse_search_queries(stream);

        let mut candidates: Vec<PartialSearchQuery> = Vec::new();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                ParseChunk::Object(value) => {
                    let mut next = value.candidates();
                    next.truncate(node.breadth);
                    for (index, candidate) in next.iter().enumerate() {
                        if candidates.get(index) != Some(candidate) {
                            self.emit(ResearchStep::GeneratingQuery {
                                node_id: child_node_id(node_id, index),
                                parent_node_id: Some(node_id.to_string()),
                                result: candidate.clone(),
                            });
                        }
                    }
                    candidates = next;
                }
                ParseChunk::Reasoning(delta) => {
                    self.emit(ResearchStep::GeneratingQueryReasoning {
                        node_id: node_id.to_string(),
                        delta,
                    });
                }
                ParseChunk::Error(message) => {
                    warn!(node_id = %node_id, error = %message, "Query generation failed");
                    self.emit_error(node_id, message);
                    break;
                }
                ParseChunk::BadEnd { raw_text } => {
                    warn!(
                        node_id = %node_id,
                        raw_chars = raw_text.len(),
                        "Query generation returned no usable structure"
                    );
                    self.emit_error(node_id, INVALID_STRUCTURED_OUTPUT);
                    break;
                }
            }
        }

        self.emit(ResearchStep::NodeComplete {
            node_id: node_id.to_string(),
            result: None,
        });

        let queries: Vec<SearchQuery> = candidates
            .iter()
            .filter_map(PartialSearchQuery::to_search_query)
            .collect();
        for (index, (query, partial)) in queries.iter().zip(&candidates).enumerate() {
            self.emit(ResearchStep::GeneratedQuery {
                node_id: child_node_id(node_id, index),
                query: query.query.clone(),
                result: partial.clone(),
            });
        }

        debug!(node_id = %node_id, queries = queries.len(), "Generated search queries");
        queries
    }

    /// One child branch, admitted through the limiter. A non-fatal failure
    /// is reported against the child and yields an empty result.
    async fn run_branch(
        &self,
        parent: &NodeInput,
        index: usize,
        query: SearchQuery,
        memories: &[String],
        breadth: usize,
    ) -> AppResult<ResearchResult> {
        let node_id = child_node_id(&parent.node_id, index);
        let permit = self.limiter.acquire().await;
        let outcome = self
            .search_and_process(parent, &node_id, &query, memories, breadth)
            .await;
        drop(permit);

        match outcome {
            Ok(result) => Ok(result),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(
                    node_id = %node_id,
                    query = %query.query,
                    error = %e,
                    "Research branch failed"
                );
                self.emit_error(&node_id, e.to_string());
                Ok(ResearchResult::default())
            }
        }
    }

    async fn search_and_process(
        &self,
        parent: &NodeInput,
        node_id: &str,
        query: &SearchQuery,
        memories: &[String],
        breadth: usize,
    ) -> AppResult<ResearchResult> {
        self.emit(ResearchStep::Searching {
            node_id: node_id.to_string(),
            query: query.query.clone(),
        });
        let options = SearchOptions {
            max_results: self.max_search_results,
            language_hint: self.search_language.clone(),
        };
        let results = self.search.search(&query.query, &options).await?;
        let new_urls: Vec<String> = results.iter().map(|r| r.url.clone()).collect();
        self.emit(ResearchStep::SearchComplete {
            node_id: node_id.to_string(),
            results: results.clone(),
        });

        let processed = self
            .process_results(node_id, query, &results, memories, breadth)
            .await;

        let merged = ResearchResult::new(
            parent
                .learnings
                .iter()
                .cloned()
                .chain(processed.learnings())
                .collect(),
            parent
                .visited_urls
                .iter()
                .cloned()
                .chain(new_urls)
                .collect(),
        );
        let follow_up_questions = processed.follow_up_questions();
        self.emit(ResearchStep::NodeComplete {
            node_id: node_id.to_string(),
            result: Some(ProcessedSearchResult {
                learnings: merged.learnings.clone(),
                follow_up_questions: follow_up_questions.clone(),
            }),
        });

        let next_depth = parent.depth + 1;
        if next_depth > self.max_depth || follow_up_questions.is_empty() {
            return Ok(merged);
        }

        info!(
            node_id = %node_id,
            breadth,
            depth = next_depth,
            "Researching deeper"
        );
        let _boost = self.limiter.boost();
        self.research_node(NodeInput {
            node_id: node_id.to_string(),
            query: next_research_query(&query.research_goal, &follow_up_questions),
            breadth,
            depth: next_depth,
            learnings: merged.learnings,
            visited_urls: merged.visited_urls,
        })
        .await
    }

    /// Stream learnings for one search. Returns whatever was parsed before
    /// the stream ended or failed.
    async fn process_results(
        &self,
        node_id: &str,
        query: &SearchQuery,
        results: &[WebSearchResult],
        memories: &[String],
        num_follow_up_questions: usize,
    ) -> PartialProcessedSearchResult {
        let contents: Vec<String> = results.iter().map(|r| r.content.clone()).collect();
        let slots = ResultPrompt {
            query: &query.query,
            contents: &contents,
            num_learnings: self.num_learnings,
            memories,
            language: &self.language,
        };
        let stream = process_search_result(
            self.llm.as_ref(),
            &self.system_prompt,
            &slots,
            num_follow_up_questions,
        )
        .await;
        let mut chunks = parse_search_result(stream);

        let mut processed = PartialProcessedSearchResult::default();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                ParseChunk::Object(value) => {
                    processed = value.clone();
                    self.emit(ResearchStep::ProcessingSearchResult {
                        node_id: node_id.to_string(),
                        query: query.query.clone(),
                        result: value,
                    });
                }
                ParseChunk::Reasoning(delta) => {
                    self.emit(ResearchStep::ProcessingSearchResultReasoning {
                        node_id: node_id.to_string(),
                        delta,
                    });
                }
                ParseChunk::Error(message) => {
                    warn!(node_id = %node_id, error = %message, "Result processing failed");
                    self.emit_error(node_id, message);
                    break;
                }
                ParseChunk::BadEnd { raw_text } => {
                    warn!(
                        node_id = %node_id,
                        raw_chars = raw_text.len(),
                        "Result processing returned no usable structure"
                    );
                    self.emit_error(node_id, INVALID_STRUCTURED_OUTPUT);
                    break;
                }
            }
        }

        debug!(
            node_id = %node_id,
            learnings = processed.learnings().len(),
            follow_ups = processed.follow_up_questions().len(),
            "Processed search result"
        );
        processed
    }
}
