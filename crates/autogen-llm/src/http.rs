//! Shared HTTP plumbing: client construction and error mapping.
//!
//! Everything protocol-specific is converted to [`BackendError`] here so no
//! reqwest or provider vocabulary crosses into the core.

use std::time::Duration;

use autogen_core::BackendError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Longest error body kept in `BackendError::Status`.
const ERROR_PREVIEW_CHARS: usize = 200;

pub(crate) fn build_client(config: &LlmConfig) -> Result<reqwest::Client, LlmError> {
    let mut headers = HeaderMap::new();
    if let Some(key) = config.api_key.as_deref() {
        let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|_| LlmError::InvalidApiKey)?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    reqwest::Client::builder()
        .user_agent(concat!("ha-autogen/", env!("CARGO_PKG_VERSION")))
        .default_headers(headers)
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| LlmError::ClientBuild(e.to_string()))
}

pub(crate) fn map_transport(err: reqwest::Error, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(timeout)
    } else if err.is_decode() {
        BackendError::InvalidResponse(err.to_string())
    } else {
        BackendError::Transport(err.without_url().to_string())
    }
}

/// Read a JSON body, mapping non-success statuses and empty or non-JSON
/// bodies to [`BackendError`].
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    timeout: Duration,
) -> Result<T, BackendError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| map_transport(e, timeout))?;

    if !status.is_success() {
        return Err(BackendError::Status {
            status: status.as_u16(),
            message: error_message(status, &body),
        });
    }
    if body.trim().is_empty() {
        return Err(BackendError::InvalidResponse(format!(
            "empty body with status {status}"
        )));
    }
    serde_json::from_str(&body)
        .map_err(|e| BackendError::InvalidResponse(format!("unexpected response shape: {e}")))
}

/// `error.message` from an OpenAI-style error body, or `error` as a string
/// (Ollama), or a preview of the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return status.canonical_reason().unwrap_or("error").to_string();
    }
    message.chars().take(ERROR_PREVIEW_CHARS).collect()
}
