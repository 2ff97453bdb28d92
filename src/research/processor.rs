//! Result processor: turns one search's results into learnings and
//! follow-up questions.

use futures::stream::BoxStream;
use tracing::debug;

use super::schema::search_result_schema;
use super::types::PartialProcessedSearchResult;
use crate::llm::{GenerationRequest, TextGenerator, TextStream};
use crate::prompts::{result_processing_prompt, ResultPrompt};
use crate::streaming::{parse_streaming_json, ParseChunk};

/// Ask the model for up to `slots.num_learnings` learnings and
/// `num_follow_up_questions` follow-ups. The raw stream is handed back
/// undriven.
pub async fn process_search_result(
    llm: &dyn TextGenerator,
    system_prompt: &str,
    slots: &ResultPrompt<'_>,
    num_follow_up_questions: usize,
) -> TextStream {
    let schema = search_result_schema(slots.num_learnings, num_follow_up_questions);
    let prompt = result_processing_prompt(slots, &schema);
    debug!(
        query = %slots.query,
        contents = slots.contents.len(),
        num_follow_up_questions,
        "Processing search results"
    );
    llm.generate(GenerationRequest::new(system_prompt, prompt)).await
}

/// Drive a result-processing stream through the structured parser. The
/// output counts as usable once it holds a learning.
pub fn parse_search_result(
    stream: TextStream,
) -> BoxStream<'static, ParseChunk<PartialProcessedSearchResult>> {
    parse_streaming_json(stream, PartialProcessedSearchResult::has_learnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StreamPart;
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use std::sync::Mutex;

    struct CannedLlm {
        body: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for CannedLlm {
        async fn generate(&self, request: GenerationRequest) -> TextStream {
            self.prompts.lock().unwrap().push(request.prompt);
            stream::iter(vec![
                StreamPart::ReasoningDelta("reading".to_string()),
                StreamPart::TextDelta(self.body.to_string()),
                StreamPart::Finish,
            ])
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_reasoning_then_object() {
        let llm = CannedLlm {
            body: r#"{"learnings":["l1"],"followUpQuestions":["f1"]}"#,
            prompts: Mutex::new(Vec::new()),
        };
        let contents = vec!["page text".to_string()];
        let slots = ResultPrompt {
            query: "q",
            contents: &contents,
            num_learnings: 3,
            memories: &[],
            language: "English",
        };

        let stream = process_search_result(&llm, "SYS", &slots, 1).await;
        let chunks: Vec<_> = parse_search_result(stream).collect().await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], ParseChunk::Reasoning("reading".to_string()));
        match &chunks[1] {
            ParseChunk::Object(result) => {
                assert_eq!(result.learnings(), vec!["l1"]);
                assert_eq!(result.follow_up_questions(), vec!["f1"]);
            }
            other => panic!("unexpected chunk: {:?}", other),
        }

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("<content>\npage text\n</content>"));
        assert!(prompts[0].contains("research the topic further, max of 1"));
    }

    #[tokio::test]
    async fn test_empty_learnings_is_bad_end() {
        let llm = CannedLlm {
            body: r#"{"learnings":[],"followUpQuestions":[]}"#,
            prompts: Mutex::new(Vec::new()),
        };
        let slots = ResultPrompt {
            query: "q",
            contents: &[],
            num_learnings: 3,
            memories: &[],
            language: "English",
        };

        let stream = process_search_result(&llm, "SYS", &slots, 2).await;
        let chunks: Vec<_> = parse_search_result(stream).collect().await;
        assert!(matches!(chunks.last(), Some(ParseChunk::BadEnd { .. })));
    }
}
