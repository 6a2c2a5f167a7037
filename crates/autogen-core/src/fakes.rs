//! In-memory backend for tests and dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{Completion, GenerationBackend};
use crate::error::BackendError;
use crate::prompt::Prompt;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Error(BackendError),
    /// Sleep, then reply with the text. Used to exercise timeouts.
    Delayed(Duration, String),
}

/// Replays a fixed sequence of replies and records every prompt it sees.
#[derive(Debug)]
pub struct ScriptedBackend {
    model: String,
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts: Mutex<Vec<Prompt>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Backend that answers each call with the next text in order.
    pub fn with_texts<I, S>(model: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new(model);
        for text in texts {
            backend.push(ScriptedReply::Text(text.into()));
        }
        backend
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn complete(&self, prompt: &Prompt) -> Result<Completion, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(ScriptedReply::Text(text)) => Ok(Completion::text(text, &self.model)),
            Some(ScriptedReply::Error(err)) => Err(err),
            Some(ScriptedReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(Completion::text(text, &self.model))
            }
            None => Err(BackendError::InvalidResponse(
                "scripted backend has no replies left".to_string(),
            )),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
