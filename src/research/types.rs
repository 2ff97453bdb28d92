use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::search::WebSearchResult;

/// Id of the root research node.
pub const ROOT_NODE_ID: &str = "0";

/// Id of child `index` under `parent`: `"{parent}-{index}"`.
pub fn child_node_id(parent: &str, index: usize) -> String {
    format!("{}-{}", parent, index)
}

/// Fan-out width of the next recursion level: `ceil(breadth / 2)`, never
/// below 1.
pub fn next_breadth(breadth: usize) -> usize {
    breadth.div_ceil(2).max(1)
}

/// A sub-query produced by the query generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: String,
    pub research_goal: String,
}

/// A [`SearchQuery`] as seen mid-stream: any field may still be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSearchQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_goal: Option<String>,
}

impl PartialSearchQuery {
    /// Whether this candidate carries a query the search executor can act on.
    ///
    /// Some models fill slots they have nothing for with placeholder text
    /// such as `undefined`.
    pub fn is_actionable(&self) -> bool {
        match self.query.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(q) => !is_placeholder(q),
        }
    }

    /// Complete the candidate, treating a missing research goal as empty.
    pub fn to_search_query(&self) -> Option<SearchQuery> {
        if !self.is_actionable() {
            return None;
        }
        Some(SearchQuery {
            query: self.query.clone().unwrap_or_default().trim().to_string(),
            research_goal: self.research_goal.clone().unwrap_or_default(),
        })
    }
}

fn is_placeholder(text: &str) -> bool {
    matches!(
        text.to_ascii_lowercase().as_str(),
        "undefined" | "null" | "none" | "n/a"
    )
}

/// Streaming shape of the query generator's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSearchQueries {
    #[serde(default)]
    pub queries: Option<Vec<PartialSearchQuery>>,
}

impl PartialSearchQueries {
    /// Actionable candidates, in stream order.
    pub fn candidates(&self) -> Vec<PartialSearchQuery> {
        self.queries
            .iter()
            .flatten()
            .filter(|q| q.is_actionable())
            .cloned()
            .collect()
    }

    /// Completeness predicate: the first query has text.
    pub fn has_first_query(&self) -> bool {
        self.queries
            .as_ref()
            .and_then(|qs| qs.first())
            .and_then(|q| q.query.as_deref())
            .is_some_and(|q| !q.is_empty())
    }
}

/// Learnings and follow-up questions extracted from one search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedSearchResult {
    pub learnings: Vec<String>,
    pub follow_up_questions: Vec<String>,
}

/// Streaming shape of the result processor's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialProcessedSearchResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learnings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_questions: Option<Vec<String>>,
}

impl PartialProcessedSearchResult {
    /// Completeness predicate: at least one learning.
    pub fn has_learnings(&self) -> bool {
        self.learnings.as_ref().is_some_and(|l| !l.is_empty())
    }

    /// Non-empty learnings found so far.
    pub fn learnings(&self) -> Vec<String> {
        non_empty(self.learnings.as_deref())
    }

    /// Non-empty follow-up questions found so far.
    pub fn follow_up_questions(&self) -> Vec<String> {
        non_empty(self.follow_up_questions.as_deref())
    }
}

fn non_empty(items: Option<&[String]>) -> Vec<String> {
    items
        .unwrap_or_default()
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && !is_placeholder(s))
        .map(str::to_string)
        .collect()
}

/// Accumulated outcome of a research subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

impl ResearchResult {
    /// Build a result, dropping duplicates while keeping first-seen order.
    pub fn new(learnings: Vec<String>, visited_urls: Vec<String>) -> Self {
        Self {
            learnings: dedup(learnings),
            visited_urls: dedup(visited_urls),
        }
    }

    /// Union of several results.
    pub fn union<I>(results: I) -> Self
    where
        I: IntoIterator<Item = ResearchResult>,
    {
        let mut learnings = Vec::new();
        let mut visited_urls = Vec::new();
        for result in results {
            learnings.extend(result.learnings);
            visited_urls.extend(result.visited_urls);
        }
        Self::new(learnings, visited_urls)
    }

    /// True when nothing was learned and nothing visited.
    pub fn is_empty(&self) -> bool {
        self.learnings.is_empty() && self.visited_urls.is_empty()
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Progress event emitted while a research run walks its tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ResearchStep {
    /// A node started generating sub-queries, or a candidate child query was
    /// created or updated mid-stream.
    GeneratingQuery {
        node_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_node_id: Option<String>,
        result: PartialSearchQuery,
    },
    /// Reasoning text from the node generating queries.
    GeneratingQueryReasoning { node_id: String, delta: String },
    /// Final form of a generated child query.
    GeneratedQuery {
        node_id: String,
        query: String,
        result: PartialSearchQuery,
    },
    /// A child started its web search.
    Searching { node_id: String, query: String },
    /// A child's web search returned.
    SearchComplete {
        node_id: String,
        results: Vec<WebSearchResult>,
    },
    /// Partial learnings extracted from a child's search results.
    ProcessingSearchResult {
        node_id: String,
        query: String,
        result: PartialProcessedSearchResult,
    },
    /// Reasoning text while processing a child's search results.
    ProcessingSearchResultReasoning { node_id: String, delta: String },
    /// A node finished its own work.
    NodeComplete {
        node_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ProcessedSearchResult>,
    },
    /// A failure isolated to one node.
    Error { node_id: String, message: String },
    /// The whole run finished. Emitted once, by the root.
    Complete {
        learnings: Vec<String>,
        visited_urls: Vec<String>,
    },
}

impl ResearchStep {
    /// Snake-case event name, as used in the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ResearchStep::GeneratingQuery { .. } => "generating_query",
            ResearchStep::GeneratingQueryReasoning { .. } => "generating_query_reasoning",
            ResearchStep::GeneratedQuery { .. } => "generated_query",
            ResearchStep::Searching { .. } => "searching",
            ResearchStep::SearchComplete { .. } => "search_complete",
            ResearchStep::ProcessingSearchResult { .. } => "processing_search_result",
            ResearchStep::ProcessingSearchResultReasoning { .. } => {
                "processing_search_result_reasoning"
            }
            ResearchStep::NodeComplete { .. } => "node_complete",
            ResearchStep::Error { .. } => "error",
            ResearchStep::Complete { .. } => "complete",
        }
    }

    /// Node the event belongs to. `Complete` belongs to the root.
    pub fn node_id(&self) -> &str {
        match self {
            ResearchStep::GeneratingQuery { node_id, .. }
            | ResearchStep::GeneratingQueryReasoning { node_id, .. }
            | ResearchStep::GeneratedQuery { node_id, .. }
            | ResearchStep::Searching { node_id, .. }
            | ResearchStep::SearchComplete { node_id, .. }
            | ResearchStep::ProcessingSearchResult { node_id, .. }
            | ResearchStep::ProcessingSearchResultReasoning { node_id, .. }
            | ResearchStep::NodeComplete { node_id, .. }
            | ResearchStep::Error { node_id, .. } => node_id,
            ResearchStep::Complete { .. } => ROOT_NODE_ID,
        }
    }
}
