//! Autogen-LLM: generation backend adapters for HA AutoGen
//!
//! Implements `autogen_core::GenerationBackend` over HTTP for Ollama and for
//! OpenAI-compatible chat-completion services. Provider-specific failures
//! are mapped to `BackendError` inside this crate.

mod config;
mod error;
mod http;
mod ollama;
mod openai;

use std::sync::Arc;

use autogen_core::GenerationBackend;

pub use config::{LlmConfig, ProviderKind};
pub use error::{LlmError, Result};
pub use ollama::OllamaBackend;
pub use openai::OpenAiCompatBackend;

/// Build the backend selected by `config.provider`.
pub fn build_backend(config: LlmConfig) -> Result<Arc<dyn GenerationBackend>> {
    if config.model.trim().is_empty() {
        return Err(LlmError::MissingModel);
    }
    tracing::info!(
        provider = %config.provider,
        base_url = %config.base_url,
        model = %config.model,
        "generation backend configured"
    );
    Ok(match config.provider {
        ProviderKind::Ollama => Arc::new(OllamaBackend::new(config)?),
        ProviderKind::OpenaiCompat => Arc::new(OpenAiCompatBackend::new(config)?),
    })
}
