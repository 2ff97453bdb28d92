//! Clarifying questions asked before a research run starts.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::schema::feedback_schema;
use crate::error::AppResult;
use crate::llm::{GenerationRequest, TextGenerator};
use crate::prompts::{feedback_prompt, system_prompt};
use crate::streaming::{collect_structured, parse_streaming_json, ParseChunk};

/// Streaming shape of the clarifying-questions answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFeedback {
    #[serde(default)]
    pub questions: Option<Vec<String>>,
}

impl PartialFeedback {
    /// Non-empty questions found so far.
    pub fn questions(&self) -> Vec<String> {
        self.questions
            .iter()
            .flatten()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn has_questions(&self) -> bool {
        self.questions.as_ref().is_some_and(|q| !q.is_empty())
    }
}

/// One item of the feedback stream.
pub type FeedbackChunk = ParseChunk<PartialFeedback>;

/// Ask up to `num_questions` clarifying questions about `query`.
pub async fn generate_feedback(
    llm: &dyn TextGenerator,
    query: &str,
    language: &str,
    num_questions: usize,
) -> BoxStream<'static, FeedbackChunk> {
    let prompt = feedback_prompt(query, num_questions, language, &feedback_schema(num_questions));
    debug!(num_questions, "Generating clarifying questions");
    let stream = llm.generate(GenerationRequest::new(system_prompt(), prompt)).await;
    parse_streaming_json(stream, PartialFeedback::has_questions)
}

/// Drain a feedback stream into its final question list.
pub async fn collect_feedback(chunks: BoxStream<'static, FeedbackChunk>) -> AppResult<Vec<String>> {
    let feedback = collect_structured(chunks).await?;
    Ok(feedback.questions())
}
