//! OpenAI-compatible `/v1/chat/completions` backend.
//!
//! Works against OpenAI itself and anything exposing the same endpoint
//! (OpenRouter, vLLM, Groq, Together).

use async_trait::async_trait;
use autogen_core::{BackendError, Completion, GenerationBackend, Prompt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::Result;
use crate::http::{build_client, map_transport, read_json};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

/// Non-streaming chat-completions client with optional bearer auth.
pub struct OpenAiCompatBackend {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatBackend {
    async fn complete(&self, prompt: &Prompt) -> std::result::Result<Completion, BackendError> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            stream: false,
        };
        debug!(
            model = %self.config.model,
            prompt_chars = prompt.system.len() + prompt.user.len(),
            "chat completions request"
        );

        let timeout = self.config.request_timeout;
        let response = self
            .client
            .post(self.url("/v1/chat/completions"))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;
        let body: CompletionResponse = read_json(response, timeout).await?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            BackendError::InvalidResponse("response has no choices".to_string())
        })?;
        let usage = body.usage;
        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            model: body.model.unwrap_or_else(|| self.config.model.clone()),
            prompt_tokens: usage.as_ref().and_then(|u| u.prompt_tokens),
            completion_tokens: usage.as_ref().and_then(|u| u.completion_tokens),
        })
    }

    async fn health_check(&self) -> std::result::Result<(), BackendError> {
        let timeout = self.config.request_timeout;
        let response = self
            .client
            .get(self.url("/v1/models"))
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Status {
                status: response.status().as_u16(),
                message: "health check failed".to_string(),
            })
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
