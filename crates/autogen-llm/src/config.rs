//! Backend connection settings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wire protocol spoken by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Ollama `/api/chat`.
    Ollama,
    /// Any `/v1/chat/completions` endpoint (OpenAI, OpenRouter, vLLM, Groq).
    OpenaiCompat,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenaiCompat => "openai_compat",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai_compat" | "openai" => Ok(ProviderKind::OpenaiCompat),
            other => Err(format!("unknown backend provider: {other}")),
        }
    }
}

/// Connection settings for one backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl LlmConfig {
    pub fn new(provider: ProviderKind, base_url: &str, model: &str) -> Self {
        Self {
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `AUTOGEN_LLM_PROVIDER`, `AUTOGEN_LLM_URL`,
    /// `AUTOGEN_LLM_MODEL` and `AUTOGEN_LLM_API_KEY`. Unparseable values are
    /// ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(provider) = env("AUTOGEN_LLM_PROVIDER").and_then(|p| p.parse().ok()) {
            config.provider = provider;
        }
        if let Some(url) = env("AUTOGEN_LLM_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = env("AUTOGEN_LLM_MODEL") {
            config.model = model;
        }
        config.api_key = env("AUTOGEN_LLM_API_KEY");
        config
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string()).filter(|k| !k.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!("OpenAI-Compat".parse::<ProviderKind>(), Ok(ProviderKind::OpenaiCompat));
        assert_eq!("ollama".parse::<ProviderKind>(), Ok(ProviderKind::Ollama));
        assert!("bedrock".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = LlmConfig::new(ProviderKind::OpenaiCompat, "https://api.example.com/", "gpt-4o")
            .with_api_key("sk-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert_eq!(config.base_url, "https://api.example.com");
    }

    #[test]
    fn test_empty_api_key_is_none() {
        let config = LlmConfig::default().with_api_key("");
        assert!(config.api_key.is_none());
    }
}
