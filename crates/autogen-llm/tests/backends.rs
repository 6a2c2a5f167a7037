use std::time::Duration;

use autogen_core::{BackendError, GenerationBackend, Prompt};
use autogen_llm::{build_backend, LlmConfig, LlmError, ProviderKind};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn prompt() -> Prompt {
    Prompt {
        system: "You write Home Assistant automations.".to_string(),
        user: "## User Request\n\nturn on the porch light".to_string(),
    }
}

// ---- Ollama ----

#[tokio::test]
async fn ollama_chat_returns_message_content_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.2",
            "stream": false,
            "messages": [
                {"role": "system", "content": "You write Home Assistant automations."},
                {"role": "user", "content": "## User Request\n\nturn on the porch light"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "```yaml\nalias: Porch\n```"},
            "prompt_eval_count": 812,
            "eval_count": 64,
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = build_backend(LlmConfig::new(ProviderKind::Ollama, &server.uri(), "llama3.2"))
        .expect("backend");
    let completion = backend.complete(&prompt()).await.expect("completion");
    assert_eq!(completion.content, "```yaml\nalias: Porch\n```");
    assert_eq!(completion.prompt_tokens, Some(812));
    assert_eq!(completion.completion_tokens, Some(64));
    assert_eq!(backend.model_name(), "llama3.2");
}

#[tokio::test]
async fn ollama_missing_message_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "chatcmpl-1"})))
        .mount(&server)
        .await;

    let backend = build_backend(LlmConfig::new(ProviderKind::Ollama, &server.uri(), "llama3.2"))
        .expect("backend");
    let err = backend.complete(&prompt()).await.expect_err("invalid");
    assert!(matches!(err, BackendError::InvalidResponse(_)));
}

#[tokio::test]
async fn ollama_empty_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let backend = build_backend(LlmConfig::new(ProviderKind::Ollama, &server.uri(), "llama3.2"))
        .expect("backend");
    let err = backend.complete(&prompt()).await.expect_err("empty");
    assert_eq!(err.kind(), "invalid_response");
}

#[tokio::test]
async fn ollama_health_check_hits_root() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Ollama is running"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = build_backend(LlmConfig::new(ProviderKind::Ollama, &server.uri(), "llama3.2"))
        .expect("backend");
    backend.health_check().await.expect("healthy");
}

// ---- OpenAI-compatible ----

#[tokio::test]
async fn openai_sends_bearer_and_reads_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "views: []"}}
            ],
            "usage": {"prompt_tokens": 100, "completion_tokens": 5, "total_tokens": 105}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = LlmConfig::new(ProviderKind::OpenaiCompat, &server.uri(), "gpt-4o-mini")
        .with_api_key("sk-test");
    let backend = build_backend(config).expect("backend");
    let completion = backend.complete(&prompt()).await.expect("completion");
    assert_eq!(completion.content, "views: []");
    assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
    assert_eq!(completion.prompt_tokens, Some(100));
}

#[tokio::test]
async fn openai_error_status_maps_to_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let backend = build_backend(LlmConfig::new(
        ProviderKind::OpenaiCompat,
        &server.uri(),
        "gpt-4o",
    ))
    .expect("backend");
    let err = backend.complete(&prompt()).await.expect_err("401");
    assert_eq!(
        err,
        BackendError::Status {
            status: 401,
            message: "Incorrect API key provided".to_string()
        }
    );
}

#[tokio::test]
async fn openai_no_choices_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let backend = build_backend(LlmConfig::new(
        ProviderKind::OpenaiCompat,
        &server.uri(),
        "gpt-4o",
    ))
    .expect("backend");
    let err = backend.complete(&prompt()).await.expect_err("no choices");
    assert!(matches!(err, BackendError::InvalidResponse(_)));
}

#[tokio::test]
async fn slow_backend_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({"choices": []})),
        )
        .mount(&server)
        .await;

    let config = LlmConfig::new(ProviderKind::OpenaiCompat, &server.uri(), "gpt-4o")
        .with_timeout(Duration::from_millis(200));
    let backend = build_backend(config).expect("backend");
    let err = backend.complete(&prompt()).await.expect_err("timeout");
    assert_eq!(err, BackendError::Timeout(Duration::from_millis(200)));
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    // Port 9 (discard) is closed on test machines.
    let backend = build_backend(LlmConfig::new(
        ProviderKind::Ollama,
        "http://127.0.0.1:9",
        "llama3.2",
    ))
    .expect("backend");
    let err = backend.complete(&prompt()).await.expect_err("refused");
    assert_eq!(err.kind(), "transport");
}

#[test]
fn empty_model_is_rejected() {
    let config = LlmConfig::new(ProviderKind::Ollama, "http://localhost:11434", " ");
    assert!(matches!(build_backend(config), Err(LlmError::MissingModel)));
}
