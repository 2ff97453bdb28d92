//! Streaming structured-output parser.
//!
//! Turns a [`TextStream`] into typed [`ParseChunk`]s. Every content delta is
//! appended to a buffer that is re-decoded with [`parse_partial_json`]; each
//! new snapshot that fits the target shape `T` is yielded as
//! [`ParseChunk::Object`]. The caller's completeness predicate decides
//! whether the stream ever produced something usable (otherwise the sequence
//! ends with [`ParseChunk::BadEnd`]) and lets the parser stop early once the
//! buffer holds a complete document that satisfies it.
//!
//! The parser is pull-driven: nothing happens between polls.

mod partial_json;

pub use partial_json::{parse_partial_json, strip_json_fence, ParseState};

use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{AppError, AppResult, LlmError};
use crate::llm::{StreamPart, TextStream};

/// One item of a parsed structured stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseChunk<T> {
    /// A new partial snapshot of the target value.
    Object(T),
    /// Reasoning text passed through verbatim.
    Reasoning(String),
    /// The underlying stream reported a terminal error.
    Error(String),
    /// The stream ended without ever satisfying the completeness predicate.
    BadEnd {
        /// Everything the model wrote, for diagnostics.
        raw_text: String,
    },
}

struct ParserState<T, F> {
    input: TextStream,
    raw_text: String,
    last_snapshot: Option<Value>,
    satisfied: bool,
    done: bool,
    is_complete: F,
    _shape: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> ParserState<T, F>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    /// Re-decode the buffer; returns a snapshot when it changed and fits `T`.
    fn snapshot(&mut self) -> Option<T> {
        let (value, state) = parse_partial_json(strip_json_fence(&self.raw_text))?;
        if !value.is_object() || self.last_snapshot.as_ref() == Some(&value) {
            return None;
        }
        let partial: T = serde_json::from_value(value.clone()).ok()?;
        self.last_snapshot = Some(value);

        if (self.is_complete)(&partial) {
            self.satisfied = true;
            if state == ParseState::Complete {
                debug!(
                    chars = self.raw_text.len(),
                    "Structured output complete, short-circuiting stream"
                );
                self.done = true;
            }
        }
        Some(partial)
    }
}

/// Drive a text stream through the incremental JSON parser.
pub fn parse_streaming_json<T, F>(input: TextStream, is_complete: F) -> BoxStream<'static, ParseChunk<T>>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(&T) -> bool + Send + 'static,
{
    let state = ParserState {
        input,
        raw_text: String::new(),
        last_snapshot: None,
        satisfied: false,
        done: false,
        is_complete,
        _shape: std::marker::PhantomData,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }
            match state.input.next().await {
                Some(StreamPart::ReasoningDelta(delta)) => {
                    return Some((ParseChunk::Reasoning(delta), state));
                }
                Some(StreamPart::TextDelta(delta)) => {
                    state.raw_text.push_str(&delta);
                    if let Some(partial) = state.snapshot() {
                        return Some((ParseChunk::Object(partial), state));
                    }
                }
                Some(StreamPart::Error(message)) => {
                    state.done = true;
                    return Some((ParseChunk::Error(message), state));
                }
                Some(StreamPart::Finish) | None => {
                    state.done = true;
                    if state.satisfied {
                        return None;
                    }
                    let raw_text = std::mem::take(&mut state.raw_text);
                    return Some((ParseChunk::BadEnd { raw_text }, state));
                }
            }
        }
    })
    .boxed()
}

/// Drain a structured stream and return its last snapshot.
pub async fn collect_structured<T>(mut chunks: BoxStream<'static, ParseChunk<T>>) -> AppResult<T> {
    let mut last = None;
    while let Some(chunk) = chunks.next().await {
        match chunk {
            ParseChunk::Object(value) => last = Some(value),
            ParseChunk::Reasoning(_) => {}
            ParseChunk::Error(message) => return Err(LlmError::Stream { message }.into()),
            ParseChunk::BadEnd { raw_text } => {
                return Err(AppError::StructuredOutput {
                    message: format!(
                        "model did not return the requested structure: {}",
                        raw_text.chars().take(100).collect::<String>()
                    ),
                })
            }
        }
    }
    last.ok_or_else(|| AppError::StructuredOutput {
        message: "stream produced no value".to_string(),
    })
}
