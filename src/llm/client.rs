use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::think::ThinkTagSplitter;
use super::types::{ChatCompletionChunk, ChatCompletionRequest, GenerationRequest, StreamPart};
use super::{TextGenerator, TextStream};
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

/// Streaming client for OpenAI-compatible chat-completions endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    request_config: RequestConfig,
}

impl OpenAiClient {
    /// Create a new client
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Open the SSE stream (internal)
    async fn open_stream(
        &self,
        request: &GenerationRequest,
    ) -> LlmResult<BoxStream<'static, Result<Vec<u8>, String>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest::streaming(&self.model, request)
            .with_temperature(self.temperature);

        debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            "Opening chat completion stream"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| e.to_string()))
            .boxed())
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, request: GenerationRequest) -> TextStream {
        let start = Instant::now();
        match self.open_stream(&request).await {
            Ok(bytes) => {
                info!(
                    model = %self.model,
                    latency_ms = start.elapsed().as_millis(),
                    "Chat completion stream opened"
                );
                sse_parts(bytes)
            }
            Err(e) => {
                error!(
                    model = %self.model,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Chat completion request failed"
                );
                stream::iter(vec![StreamPart::Error(e.to_string())]).boxed()
            }
        }
    }
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>, String>>,
    buffer: Vec<u8>,
    pending: VecDeque<StreamPart>,
    splitter: ThinkTagSplitter,
    terminated: bool,
    exhausted: bool,
}

impl SseState {
    fn terminate(&mut self, part: StreamPart) {
        if self.terminated {
            return;
        }
        if matches!(part, StreamPart::Finish) {
            let rest = self.splitter.finish();
            self.pending.extend(rest);
        }
        self.pending.push_back(part);
        self.terminated = true;
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim());
            if self.terminated {
                self.buffer.clear();
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            self.terminate(StreamPart::Finish);
            return;
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "Skipping malformed stream chunk");
                return;
            }
        };

        if let Some(err) = chunk.error {
            self.terminate(StreamPart::Error(err.message));
            return;
        }

        for choice in chunk.choices {
            let delta = choice.delta;
            if let Some(reasoning) = delta.reasoning_content.or(delta.reasoning) {
                if !reasoning.is_empty() {
                    self.pending.push_back(StreamPart::ReasoningDelta(reasoning));
                }
            }
            if let Some(content) = delta.content {
                let parts = self.splitter.push(&content);
                self.pending.extend(parts);
            }
        }
    }
}

/// Turn a raw SSE byte stream into stream parts. Always ends with exactly
/// one terminal part.
pub(crate) fn sse_parts(bytes: BoxStream<'static, Result<Vec<u8>, String>>) -> TextStream {
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        splitter: ThinkTagSplitter::new(),
        terminated: false,
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(part) = state.pending.pop_front() {
                return Some((part, state));
            }
            if state.terminated || state.exhausted {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    state.drain_lines();
                }
                Some(Err(message)) => {
                    state.terminate(StreamPart::Error(format!("Stream error: {}", message)));
                }
                None => {
                    state.exhausted = true;
                    if !state.buffer.is_empty() {
                        let tail = std::mem::take(&mut state.buffer);
                        let line = String::from_utf8_lossy(&tail).to_string();
                        state.handle_line(line.trim());
                    }
                    state.terminate(StreamPart::Finish);
                }
            }
        }
    })
    .boxed()
}
