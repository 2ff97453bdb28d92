//! Final report writer.

use tracing::info;

use crate::error::AppResult;
use crate::llm::{collect_text, GenerationRequest, TextGenerator, TextStream};
use crate::memory::{preferences_or_empty, PreferenceStore};
use crate::prompts::{final_report_prompt, system_prompt};

/// Inputs of the final report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    /// The user's original research prompt.
    pub prompt: String,
    /// Learnings gathered by the research run.
    pub learnings: Vec<String>,
    /// Language the report is written in.
    pub language: String,
}

/// Start writing a Markdown report tailored to the user's preferences.
///
/// Preferences are best-effort. The raw stream is returned undriven.
pub async fn write_final_report(
    llm: &dyn TextGenerator,
    preferences: &dyn PreferenceStore,
    request: &ReportRequest,
) -> TextStream {
    let memories = preferences_or_empty(preferences).await;
    let prompt = final_report_prompt(
        &request.prompt,
        &request.learnings,
        &memories,
        &request.language,
    );
    info!(
        learnings = request.learnings.len(),
        preferences = memories.len(),
        prompt_chars = prompt.len(),
        "Writing final report"
    );
    llm.generate(GenerationRequest::new(system_prompt(), prompt)).await
}

/// Drain a report stream into its Markdown text.
pub async fn collect_report(stream: TextStream) -> AppResult<String> {
    Ok(collect_text(stream).await?.trim().to_string())
}
