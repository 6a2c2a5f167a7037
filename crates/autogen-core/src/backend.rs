//! Generation backend contract.
//!
//! The core depends only on this trait. Adapters translate their own
//! protocol and failure shapes into [`Completion`] and [`BackendError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::prompt::Prompt;

/// Final text of one completion plus usage, when the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

impl Completion {
    pub fn text(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            prompt_tokens: None,
            completion_tokens: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// A text-completion service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Complete `prompt`, returning the whole reply. Streaming, if any, is
    /// the adapter's business.
    async fn complete(&self, prompt: &Prompt) -> Result<Completion, BackendError>;

    /// Cheap reachability check.
    async fn health_check(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Model name, used to look up the context window.
    fn model_name(&self) -> &str;
}
