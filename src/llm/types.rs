use serde::{Deserialize, Serialize};

/// One incremental fragment of a text-generation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    /// Answer text delta.
    TextDelta(String),
    /// Model reasoning delta, passed through verbatim.
    ReasoningDelta(String),
    /// Terminal failure reported by the collaborator.
    Error(String),
    /// Terminal successful end of the stream.
    Finish,
}

impl StreamPart {
    /// Whether this part terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamPart::Error(_) | StreamPart::Finish)
    }
}

/// A single generation request: fixed system instruction plus user prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
}

impl GenerationRequest {
    /// Create a new generation request
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Message in a chat-completions conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Streaming chat-completions request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ChatCompletionRequest {
    /// Build a streaming request from a generation request
    pub fn streaming(model: impl Into<String>, request: &GenerationRequest) -> Self {
        Self {
            model: model.into(),
            messages: vec![
                Message::system(request.system.clone()),
                Message::user(request.prompt.clone()),
            ],
            stream: true,
            temperature: None,
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// One `data:` payload of a chat-completions SSE stream
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub error: Option<ChunkError>,
}

/// Choice entry inside a stream chunk
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental delta of a choice
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    /// DeepSeek-style reasoning field.
    #[serde(default)]
    pub reasoning_content: Option<String>,
    /// OpenRouter-style reasoning field.
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Error object embedded in a stream chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkError {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_request_serializes_system_then_user() {
        let request = GenerationRequest::new("be brief", "what is rust?");
        let body = ChatCompletionRequest::streaming("gpt-4o-mini", &request);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be brief");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_streaming_request_with_temperature() {
        let request = GenerationRequest::new("s", "p");
        let body = ChatCompletionRequest::streaming("m", &request).with_temperature(Some(0.3));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["temperature"], 0.3);
    }

    #[test]
    fn test_chunk_deserializes_reasoning_fields() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"reasoning_content":"hmm"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(
            chunk.choices[0].delta.reasoning_content.as_deref(),
            Some("hmm")
        );
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn test_chunk_deserializes_error() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"error":{"message":"overloaded"}}"#).unwrap();
        assert!(chunk.choices.is_empty());
        assert_eq!(chunk.error.unwrap().message, "overloaded");
    }

    #[test]
    fn test_terminal_parts() {
        assert!(StreamPart::Finish.is_terminal());
        assert!(StreamPart::Error("x".into()).is_terminal());
        assert!(!StreamPart::TextDelta("x".into()).is_terminal());
    }
}
