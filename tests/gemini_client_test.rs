//! Mock-based tests for the Gemini client.
//!
//! These tests use wiremock to simulate the provider without making actual
//! HTTP requests to Google.

use assert_matches::assert_matches;
use futures::StreamExt;
use gemini_gateway::{
    api::models::{ConversationTurn, FinishReason, Role},
    core::{AppConfig, AppError, StreamCancelHandle},
    services::{GenerationInput, GenerationOptions, ModelClient, StreamEvent},
    GeminiClient,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";
const STREAM_PATH: &str = "/v1beta/models/gemini-2.5-flash:streamGenerateContent";

fn test_config(mock_server: &MockServer) -> AppConfig {
    let mut config = AppConfig::new("test-key");
    config.api_base = mock_server.uri();
    config.request_timeout_secs = 5;
    config
}

fn client_for(mock_server: &MockServer) -> GeminiClient {
    GeminiClient::new(&test_config(mock_server)).expect("client builds")
}

fn options() -> GenerationOptions {
    GenerationOptions {
        model: "gemini-2.5-flash".to_string(),
        temperature: 0.5,
        max_output_tokens: Some(10),
    }
}

fn text_response(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {
            "promptTokenCount": 4,
            "candidatesTokenCount": 3,
            "totalTokenCount": 7
        },
        "modelVersion": "gemini-2.5-flash"
    })
}

#[tokio::test]
async fn test_generate_once_sends_expected_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "Say HELLO twice."}]}],
            "systemInstruction": {"parts": [{"text": "Shout."}]},
            "generationConfig": {
                "temperature": 0.5,
                "maxOutputTokens": 10,
                "responseModalities": ["TEXT"],
                "thinkingConfig": {"thinkingBudget": 0}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("HELLO HELLO")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server)
        .generate_once("Say HELLO twice.", Some("Shout."), &options())
        .await
        .unwrap();

    assert_eq!(result.text, "HELLO HELLO");
    assert_eq!(result.model, "gemini-2.5-flash");
    assert_eq!(result.finish_reason, Some(FinishReason::Stop));
    let usage = result.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 4);
    assert_eq!(usage.completion_tokens, 3);
    assert_eq!(usage.total_tokens, 7);
}

#[tokio::test]
async fn test_generate_chat_maps_roles() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_partial_json(json!({
            "contents": [
                {"role": "user", "parts": [{"text": "Hi"}]},
                {"role": "model", "parts": [{"text": "Hello!"}]},
                {"role": "user", "parts": [{"text": "Capital of France?"}]}
            ],
            "systemInstruction": {"parts": [{"text": "Be brief."}]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Paris.")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let turns = vec![
        ConversationTurn::new(Role::System, "Be brief."),
        ConversationTurn::new(Role::User, "Hi"),
        ConversationTurn::new(Role::Model, "Hello!"),
        ConversationTurn::new(Role::User, "Capital of France?"),
    ];
    let result = client_for(&mock_server)
        .generate_chat(&turns, &options())
        .await
        .unwrap();

    assert_eq!(result.text, "Paris.");
}

#[tokio::test]
async fn test_invalid_api_key_is_auth_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{"reason": "API_KEY_INVALID"}]
            }
        })))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .generate_once("hi", None, &options())
        .await
        .unwrap_err();

    assert_matches!(err, AppError::UpstreamAuth(ref msg) if msg.contains("API key not valid"));
}

#[tokio::test]
async fn test_forbidden_is_auth_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Permission denied", "status": "PERMISSION_DENIED"}
        })))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .generate_once("hi", None, &options())
        .await
        .unwrap_err();

    assert_matches!(err, AppError::UpstreamAuth(_));
}

#[tokio::test]
async fn test_rate_limit_is_classified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .generate_once("hi", None, &options())
        .await
        .unwrap_err();

    assert_matches!(err, AppError::UpstreamRateLimit(ref msg) if msg == "Resource has been exhausted");
}

#[tokio::test]
async fn test_server_error_is_provider_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .generate_once("hi", None, &options())
        .await
        .unwrap_err();

    assert_matches!(err, AppError::UpstreamProvider { status: 503, ref message } if message == "overloaded");
}

#[tokio::test]
async fn test_blocked_prompt_is_content_policy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .generate_once("something unsafe", None, &options())
        .await
        .unwrap_err();

    assert_matches!(err, AppError::UpstreamContentPolicy { ref reason, .. } if reason == "SAFETY");
}

#[tokio::test]
async fn test_invalid_json_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&mock_server)
        .await;

    let err = client_for(&mock_server)
        .generate_once("hi", None, &options())
        .await
        .unwrap_err();

    assert_matches!(err, AppError::UpstreamMalformedResponse(_));
}

#[tokio::test]
async fn test_upstream_timeout_is_transport_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(text_response("late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server);
    config.request_timeout_secs = 1;
    let err = GeminiClient::new(&config)
        .unwrap()
        .generate_once("hi", None, &options())
        .await
        .unwrap_err();

    assert_matches!(err, AppError::UpstreamTransport { timeout: true, .. });
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let mut config = AppConfig::new("test-key");
    config.api_base = "http://127.0.0.1:1".to_string();
    config.request_timeout_secs = 5;

    let err = GeminiClient::new(&config)
        .unwrap()
        .generate_once("hi", None, &options())
        .await
        .unwrap_err();

    assert_matches!(err, AppError::UpstreamTransport { timeout: false, .. });
}

#[tokio::test]
async fn test_stream_yields_deltas_then_done() {
    let mock_server = MockServer::start().await;

    let body = concat!(
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"HELLO\"}]}}]}\r\n\r\n",
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\" HELLO\"}]},\"finishReason\":\"STOP\"}],",
        "\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":2,\"totalTokenCount\":6}}\r\n\r\n"
    );

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let input = GenerationInput::Prompt {
        prompt: "Say HELLO twice.".to_string(),
        system_instruction: None,
    };
    let stream = client_for(&mock_server)
        .generate_stream(input, options(), StreamCancelHandle::new())
        .await
        .unwrap();
    let events: Vec<StreamEvent> = stream.map(|event| event.unwrap()).collect().await;

    assert_eq!(events.len(), 3);
    assert_eq!(events[0], StreamEvent::Delta("HELLO".to_string()));
    assert_eq!(events[1], StreamEvent::Delta(" HELLO".to_string()));
    assert_matches!(&events[2], StreamEvent::Done(result) => {
        assert_eq!(result.text, "HELLO HELLO");
        assert_eq!(result.finish_reason, Some(FinishReason::Stop));
        assert_eq!(result.usage.as_ref().map(|u| u.total_tokens), Some(6));
    });
}

#[tokio::test]
async fn test_stream_open_failure_is_returned_before_stream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Quota exceeded"}
        })))
        .mount(&mock_server)
        .await;

    let input = GenerationInput::Prompt {
        prompt: "hi".to_string(),
        system_instruction: None,
    };
    let result = client_for(&mock_server)
        .generate_stream(input, options(), StreamCancelHandle::new())
        .await
        .map(|_| ()); // stream type has no Debug impl

    assert_matches!(result, Err(AppError::UpstreamRateLimit(_)));
}

#[tokio::test]
async fn test_stream_empty_body_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw("", "text/event-stream"))
        .mount(&mock_server)
        .await;

    let input = GenerationInput::Turns(vec![ConversationTurn::new(Role::User, "hi")]);
    let events: Vec<_> = client_for(&mock_server)
        .generate_stream(input, options(), StreamCancelHandle::new())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert_matches!(&events[0], Err(AppError::UpstreamMalformedResponse(_)));
}

#[tokio::test]
async fn test_cancelled_stream_yields_nothing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"x\"}]}}]}\n\n",
            "text/event-stream",
        ))
        .mount(&mock_server)
        .await;

    let cancel = StreamCancelHandle::new();
    cancel.cancel();
    let input = GenerationInput::Prompt {
        prompt: "hi".to_string(),
        system_instruction: None,
    };
    let events: Vec<_> = client_for(&mock_server)
        .generate_stream(input, options(), cancel)
        .await
        .unwrap()
        .collect()
        .await;

    assert!(events.is_empty());
}
