//! Query generator: one generation call per research node.

use futures::stream::BoxStream;
use tracing::debug;

use super::schema::search_queries_schema;
use super::types::PartialSearchQueries;
use crate::llm::{GenerationRequest, TextGenerator, TextStream};
use crate::prompts::{query_generation_prompt, QueryPrompt};
use crate::streaming::{parse_streaming_json, ParseChunk};

/// Ask the model for up to `slots.num_queries` sub-queries. The raw stream
/// is handed back undriven.
pub async fn generate_search_queries(
    llm: &dyn TextGenerator,
    system_prompt: &str,
    slots: &QueryPrompt<'_>,
) -> TextStream {
    let schema = search_queries_schema(slots.num_queries);
    let prompt = query_generation_prompt(slots, &schema);
    debug!(
        num_queries = slots.num_queries,
        learnings = slots.learnings.len(),
        preferences = slots.memories.len(),
        "Generating search queries"
    );
    llm.generate(GenerationRequest::new(system_prompt, prompt)).await
}

/// Drive a query-generation stream through the structured parser. The
/// output counts as usable once the first query has text.
pub fn parse_search_queries(stream: TextStream) -> BoxStream<'static, ParseChunk<PartialSearchQueries>> {
    parse_streaming_json(stream, PartialSearchQueries::has_first_query)
}
