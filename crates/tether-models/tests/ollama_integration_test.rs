//! Integration tests for OllamaBackend against a mocked Ollama server.

use mockito::Matcher;
use serde_json::json;
use tether_abstraction::{BackendError, ChatBackend, ChatTurn};
use tether_models::{GenerationMode, GenerationOptions, OllamaBackend};

#[tokio::test]
async fn test_ollama_chat_mode_sends_history_as_messages() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .match_body(Matcher::PartialJson(json!({
            "model": "llama3.2",
            "stream": false,
            "messages": [
                {"role": "user", "content": "Hello"},
                {"role": "assistant", "content": "Hi!"},
                {"role": "user", "content": "Tell me a joke"}
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"model":"llama3.2","message":{"role":"assistant","content":"Why did the crab cross?"},"done":true}"#)
        .create_async()
        .await;

    let backend = OllamaBackend::with_base_url("llama3.2".to_string(), server.url());
    let history = vec![ChatTurn::answered("Hello", "Hi!"), ChatTurn::prompt("Tell me a joke")];
    let answer = backend.chat(&history).await.unwrap();

    assert_eq!(answer, "Why did the crab cross?");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ollama_generate_mode_extracts_assistant_reply() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({
            "model": "llama3.2",
            "prompt": "Human: What is 2+2?\nAssistant: ",
            "options": {"temperature": 0.0}
        })))
        .with_status(200)
        .with_body(r#"{"response":"Assistant:  4 ","done":true}"#)
        .create_async()
        .await;

    let backend = OllamaBackend::with_base_url("llama3.2".to_string(), server.url())
        .with_mode(GenerationMode::Generate)
        .with_options(GenerationOptions { temperature: Some(0.0), max_tokens: None });
    let answer = backend.chat(&[ChatTurn::prompt("What is 2+2?")]).await.unwrap();

    assert_eq!(answer, "4");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ollama_model_not_found_maps_to_response_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/chat")
        .with_status(404)
        .with_body(r#"{"error":"model 'llama9' not found, try pulling it first"}"#)
        .create_async()
        .await;

    let backend = OllamaBackend::with_base_url("llama9".to_string(), server.url());
    let err = backend.chat(&[ChatTurn::prompt("hi")]).await.unwrap_err();

    match err {
        BackendError::Response(message) => assert!(message.contains("ollama pull llama9")),
        other => panic!("Expected Response error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ollama_malformed_body_maps_to_serialization_error() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/api/chat").with_status(200).with_body("not json").create_async().await;

    let backend = OllamaBackend::with_base_url("llama3.2".to_string(), server.url());
    let err = backend.chat(&[ChatTurn::prompt("hi")]).await.unwrap_err();
    assert!(matches!(err, BackendError::Serialization(_)));
}

#[tokio::test]
async fn test_ollama_unreachable_server_maps_to_request_error() {
    // Port 9 (discard) is not expected to run an HTTP server.
    let backend = OllamaBackend::with_base_url("llama3.2".to_string(), "http://127.0.0.1:9".to_string());
    let err = backend.chat(&[ChatTurn::prompt("hi")]).await.unwrap_err();
    assert!(matches!(err, BackendError::Request(_)));
}
