//! Ollama `/api/chat` backend.

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
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    message: Option<ResponseMessage>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// Non-streaming Ollama chat client.
pub struct OllamaBackend {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn complete(&self, prompt: &Prompt) -> std::result::Result<Completion, BackendError> {
        let request = ChatRequest {
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
            "ollama chat request"
        );

        let timeout = self.config.request_timeout;
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;
        let body: ChatResponse = read_json(response, timeout).await?;

        let message = body.message.ok_or_else(|| {
            BackendError::InvalidResponse("missing 'message' in chat response".to_string())
        })?;
        Ok(Completion {
            content: message.content,
            model: body.model.unwrap_or_else(|| self.config.model.clone()),
            prompt_tokens: body.prompt_eval_count,
            completion_tokens: body.eval_count,
        })
    }

    async fn health_check(&self) -> std::result::Result<(), BackendError> {
        let timeout = self.config.request_timeout;
        let response = self
            .client
            .get(self.url("/"))
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
