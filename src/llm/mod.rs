//! Text-generation collaborator.
//!
//! The orchestrator only sees [`TextGenerator`]: one call per prompt, handing
//! back a stream of [`StreamPart`]s that always ends with an `Error` or a
//! `Finish` part. [`OpenAiClient`] is the HTTP implementation.

mod client;
mod think;
mod types;

pub use client::OpenAiClient;
pub use think::ThinkTagSplitter;
pub use types::*;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{LlmError, LlmResult};

/// Stream of generation fragments, consumed once.
pub type TextStream = BoxStream<'static, StreamPart>;

/// A streaming text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Issue one generation request. Transport failures are reported as a
    /// terminal [`StreamPart::Error`] rather than a `Result`.
    async fn generate(&self, request: GenerationRequest) -> TextStream;
}

/// Drain a text stream into its answer text, ignoring reasoning.
pub async fn collect_text(mut stream: TextStream) -> LlmResult<String> {
    let mut text = String::new();
    while let Some(part) = stream.next().await {
        match part {
            StreamPart::TextDelta(delta) => text.push_str(&delta),
            StreamPart::ReasoningDelta(_) => {}
            StreamPart::Error(message) => return Err(LlmError::Stream { message }),
            StreamPart::Finish => break,
        }
    }
    Ok(text)
}
