//! Integration tests for the streaming chat-completions client
//!
//! Tests request shape and SSE decoding using wiremock.

use futures::StreamExt;
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use deep_research::config::{LlmConfig, RequestConfig};
use deep_research::llm::{collect_text, GenerationRequest, OpenAiClient, StreamPart, TextGenerator};

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str) -> OpenAiClient {
    let config = LlmConfig {
        api_key: "test-api-key".to_string(),
        base_url: format!("{}/v1", base_url),
        model: "test-model".to_string(),
        temperature: None,
    };

    OpenAiClient::new(&config, RequestConfig { timeout_ms: 5000 }).expect("Failed to create client")
}

fn sse_body(events: &[serde_json::Value]) -> String {
    let mut body: String = events
        .iter()
        .map(|e| format!("data: {}\n\n", e))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn content_chunk(text: &str) -> serde_json::Value {
    json!({"choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]})
}

#[tokio::test]
async fn test_streams_content_deltas() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": true,
            "messages": [
                {"role": "system", "content": "be precise"},
                {"role": "user", "content": "hello"}
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&[content_chunk("Hel"), content_chunk("lo")])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let parts: Vec<StreamPart> = client
        .generate(GenerationRequest::new("be precise", "hello"))
        .await
        .collect()
        .await;

    assert_eq!(
        parts,
        vec![
            StreamPart::TextDelta("Hel".to_string()),
            StreamPart::TextDelta("lo".to_string()),
            StreamPart::Finish,
        ]
    );
}

#[tokio::test]
async fn test_reasoning_is_separated_from_content() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(sse_body(&[
                json!({"choices": [{"delta": {"reasoning_content": "weighing sources"}}]}),
                content_chunk("<think>more</think>"),
                content_chunk("answer"),
            ])),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let parts: Vec<StreamPart> = client
        .generate(GenerationRequest::new("s", "p"))
        .await
        .collect()
        .await;

    let reasoning: String = parts
        .iter()
        .filter_map(|p| match p {
            StreamPart::ReasoningDelta(d) => Some(d.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(reasoning, "weighing sourcesmore");
    assert_eq!(parts.last(), Some(&StreamPart::Finish));

    let text = collect_text(
        client
            .generate(GenerationRequest::new("s", "p"))
            .await,
    )
    .await
    .unwrap();
    assert_eq!(text, "answer");
}

#[tokio::test]
async fn test_http_error_becomes_terminal_error_part() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let parts: Vec<StreamPart> = client
        .generate(GenerationRequest::new("s", "p"))
        .await
        .collect()
        .await;

    assert_eq!(parts.len(), 1);
    match &parts[0] {
        StreamPart::Error(message) => {
            assert!(message.contains("401"));
            assert!(message.contains("invalid api key"));
        }
        other => panic!("expected error part, got {:?}", other),
    }
}

#[tokio::test]
async fn test_error_payload_in_stream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&[
            content_chunk("partial"),
            json!({"error": {"message": "context length exceeded"}}),
        ])))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri());
    let err = collect_text(client.generate(GenerationRequest::new("s", "p")).await)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("context length exceeded"));
}
