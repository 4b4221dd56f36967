//! Integration tests for OpenAIBackend against a mocked OpenAI-compatible server.

use mockito::Matcher;
use serde_json::json;
use tether_abstraction::{BackendError, ChatBackend, ChatTurn};
use tether_models::OpenAIBackend;

#[tokio::test]
async fn test_openai_chat_completion_with_bearer_auth() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "Say hello"}]
        })))
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"}}]}"#)
        .create_async()
        .await;

    let backend =
        OpenAIBackend::new("gpt-4o-mini".to_string(), server.url(), Some("sk-test".to_string()));
    let answer = backend.chat(&[ChatTurn::prompt("Say hello")]).await.unwrap();

    assert_eq!(answer, "Hello!");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_openai_without_key_sends_no_auth_header() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"local"}}]}"#)
        .create_async()
        .await;

    let backend = OpenAIBackend::new("qwen2".to_string(), server.url(), None);
    assert_eq!(backend.chat(&[ChatTurn::prompt("x")]).await.unwrap(), "local");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_openai_rate_limit_is_response_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_body(r#"{"error":{"message":"Rate limit reached"}}"#)
        .create_async()
        .await;

    let backend = OpenAIBackend::new("gpt-4o-mini".to_string(), server.url(), Some("k".to_string()));
    let err = backend.chat(&[ChatTurn::prompt("x")]).await.unwrap_err();
    match err {
        BackendError::Response(message) => assert!(message.contains("Rate limit reached")),
        other => panic!("Expected Response error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_openai_empty_choices_is_response_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(r#"{"choices":[]}"#)
        .create_async()
        .await;

    let backend = OpenAIBackend::new("gpt-4o-mini".to_string(), server.url(), None);
    let err = backend.chat(&[ChatTurn::prompt("x")]).await.unwrap_err();
    assert_eq!(err, BackendError::Response("No content in API response".to_string()));
}
